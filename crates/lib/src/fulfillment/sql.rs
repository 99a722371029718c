//! Table schema formatting and SQL extraction for the BigQuery handler.

use crate::google::QueryResult;

/// Columns the model may see when writing SQL.
pub const ALLOWED_COLUMNS: &[&str] = &[
    "BrandName",
    "Brand_Desc",
    "Category",
    "Currancy",
    "Product_Name",
    "Product_Size",
    "SellPrice",
];

/// Strip Markdown code fences from a model reply. Without fences the whole reply is the query.
pub fn extract_sql_query(reply: &str) -> String {
    reply.replace("```sql", "").replace("```", "").trim().to_string()
}

/// Keep only schema rows whose `column_name` is in [`ALLOWED_COLUMNS`].
/// Fails when the schema result has no `column_name` column.
pub fn filter_columns(schema: QueryResult) -> Result<QueryResult, String> {
    let idx = schema
        .column("column_name")
        .ok_or_else(|| "schema result has no column_name".to_string())?;
    let rows = schema
        .rows
        .into_iter()
        .filter(|row| {
            row.get(idx)
                .map(|name| ALLOWED_COLUMNS.contains(&name.as_str()))
                .unwrap_or(false)
        })
        .collect();
    Ok(QueryResult::new(schema.columns, rows))
}

/// `- <column_name> (<data_type>)`, one line per schema row.
pub fn format_columns(schema: &QueryResult) -> String {
    let (Some(name), Some(ty)) = (schema.column("column_name"), schema.column("data_type")) else {
        return String::new();
    };
    schema
        .rows
        .iter()
        .map(|row| {
            format!(
                "- {} ({})",
                row.get(name).map(String::as_str).unwrap_or(""),
                row.get(ty).map(String::as_str).unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
