//! Prompt templates for the fulfillment handlers.

/// SQL generation prompt for the BigQuery handler.
pub fn sql_generation_prompt(
    project_id: &str,
    dataset: &str,
    table: &str,
    columns: &str,
    user_query: &str,
) -> String {
    format!(
        r#"
You are a SQL expert. Write a SQL command to answer the user's question based on the context given.

<instructions>
- Pay attention to the columns names.
- Pay attention to the project id.
- Pay attention to the dataset and table name.
- Use only a column or a table name if you are possitive that exists.
- Provide only the sql code ready to be run in bigquery.
- If the information to answer the user question is not in the table, reply that you cannot answer that question.
</instructions>

<context>
Project ID: {project_id}
Dataset: {dataset}
Table: {table}
Columns: 
{columns}

User question: {user_query}
</context>

SQL:
"#
    )
}

/// Asks for a natural-language answer from a query result (or the placeholder text).
pub fn answer_prompt(query_results: &str, user_query: &str) -> String {
    format!(
        r#"
System: 
```
{query_results}
```
Answer the user's question using this information. Do not generate SQL code.

User: {user_query}
AI: 
"#
    )
}

/// Answers from a document-search summary.
pub fn datastore_prompt(summary: &str, user_query: &str) -> String {
    format!(
        r#"
Sos un agente llamado GCPBot necesito que respondas basado en esta informacion la pregunta de mi usuario, basada en esta informacion:


<information>
{summary}
</information>

User: {user_query}
AI: 
"#
    )
}

/// Column metadata for every table in `dataset`.
pub fn columns_sql(dataset: &str) -> String {
    format!(
        r#"
        SELECT
            TABLE_CATALOG as project_id, TABLE_SCHEMA as owner, TABLE_NAME as table_name, COLUMN_NAME as column_name,
            IS_NULLABLE as is_nullable, DATA_TYPE as data_type, COLUMN_DEFAULT as column_default, ROUNDING_MODE as rounding_mode
        FROM
            {dataset}.INFORMATION_SCHEMA.COLUMNS
        ORDER BY
            project_id, owner, table_name, column_name;
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_prompt_fills_context() {
        let p = sql_generation_prompt("demo", "shop", "products", "- SellPrice (FLOAT64)", "average price");
        assert!(p.contains("Project ID: demo\nDataset: shop\nTable: products"));
        assert!(p.contains("Columns: \n- SellPrice (FLOAT64)\n"));
        assert!(p.contains("User question: average price"));
    }

    #[test]
    fn answer_prompt_fences_results() {
        let p = answer_prompt("| a |", "q");
        assert!(p.contains("```\n| a |\n```"));
        assert!(p.ends_with("User: q\nAI: \n"));
    }

    #[test]
    fn datastore_prompt_keeps_blank_lines_before_information() {
        let p = datastore_prompt("Gemini Ultra.", "q");
        assert!(p.contains("esta informacion:\n\n\n<information>\nGemini Ultra.\n</information>"));
        assert!(p.contains("User: q\nAI: "));
    }

    #[test]
    fn columns_sql_targets_dataset() {
        assert!(columns_sql("shop").contains("shop.INFORMATION_SCHEMA.COLUMNS"));
    }
}
