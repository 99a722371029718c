//! Dialogflow CX fulfillment webhook.
//!
//! Requests are routed by `fulfillmentInfo.tag`. Both backends answer through one shared
//! conversational context, created on the first request and kept for the process lifetime.

pub mod prompts;
pub mod protocol;
mod server;
pub mod sql;

pub use protocol::{WebhookRequest, WebhookResponse, WebhookTag};
pub use server::{fulfillment_app, run_fulfillment};

use crate::google::{DocumentSearch, QueryExecutor};
use crate::llm::GenerativeBackend;
use crate::session::ChatSession;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const INVALID_TAG: &str = "Invalid webhook tag.";
pub const SCHEMA_ERROR: &str = "Error fetching column information.";
/// Stands in for the result table when the generated SQL cannot be run.
pub const NO_DATA_ANSWER: &str = "I cannot answer that question based on the available data.";
pub const ANSWER_ERROR: &str = "Sorry, something went wrong while answering your question.";

/// Where the BigQuery handler looks for data.
#[derive(Debug, Clone, Default)]
pub struct FulfillmentSettings {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
}

/// Fulfillment handlers plus the process-wide conversational context.
pub struct FulfillmentService {
    model: Arc<dyn GenerativeBackend>,
    context: OnceCell<ChatSession>,
    queries: Arc<dyn QueryExecutor>,
    search: Arc<dyn DocumentSearch>,
    settings: FulfillmentSettings,
}

impl FulfillmentService {
    pub fn new(
        model: Arc<dyn GenerativeBackend>,
        queries: Arc<dyn QueryExecutor>,
        search: Arc<dyn DocumentSearch>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            model,
            context: OnceCell::new(),
            queries,
            search,
            settings,
        }
    }

    /// True once a request has created the conversational context.
    pub fn has_context(&self) -> bool {
        self.context.initialized()
    }

    async fn context(&self) -> &ChatSession {
        self.context
            .get_or_init(|| async move {
                log::info!("fulfillment: starting conversational context");
                ChatSession::new(self.model.clone())
            })
            .await
    }

    /// Answer one webhook call. Never fails: errors become fixed reply texts.
    pub async fn dispatch(&self, req: &WebhookRequest) -> WebhookResponse {
        let context = self.context().await;
        let tag = req.tag();
        log::info!("fulfillment: tag={:?}", tag);
        let reply = match WebhookTag::parse(tag) {
            WebhookTag::BigQuery => self.answer_from_table(context, req.text()).await,
            WebhookTag::DataStore => self.answer_from_documents(context, req.text()).await,
            WebhookTag::Unknown => INVALID_TAG.to_string(),
        };
        WebhookResponse::text(reply)
    }

    /// Allow-listed columns of the dataset, formatted for the SQL prompt.
    async fn table_columns(&self) -> Result<String, String> {
        let schema = self
            .queries
            .run_query(&prompts::columns_sql(&self.settings.dataset))
            .await
            .map_err(|e| e.to_string())?;
        let schema = sql::filter_columns(schema)?;
        Ok(sql::format_columns(&schema))
    }

    async fn answer_from_table(&self, context: &ChatSession, question: &str) -> String {
        log::info!("fulfillment: bq question: {}", question);
        let columns = match self.table_columns().await {
            Ok(c) => c,
            Err(e) => {
                log::error!("fulfillment: fetching column information failed: {}", e);
                return SCHEMA_ERROR.to_string();
            }
        };
        let prompt = prompts::sql_generation_prompt(
            &self.settings.project_id,
            &self.settings.dataset,
            &self.settings.table,
            &columns,
            question,
        );
        log::debug!("fulfillment: sql prompt: {}", prompt);

        // Both turns of this request go through one lock.
        let mut conversation = context.lock().await;
        let reply = match conversation.send_message(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                log::error!("fulfillment: sql generation failed: {}", e);
                return ANSWER_ERROR.to_string();
            }
        };
        let query = sql::extract_sql_query(&reply);
        log::info!("fulfillment: generated sql: {}", query);

        let results = match self.queries.run_query(&query).await {
            Ok(table) => {
                log::info!("fulfillment: sql returned {} rows", table.rows.len());
                table.to_markdown()
            }
            Err(e) => {
                log::warn!("fulfillment: executing generated sql failed: {}", e);
                NO_DATA_ANSWER.to_string()
            }
        };
        match conversation
            .send_message(&prompts::answer_prompt(&results, question))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("fulfillment: answer generation failed: {}", e);
                ANSWER_ERROR.to_string()
            }
        }
    }

    async fn answer_from_documents(&self, context: &ChatSession, question: &str) -> String {
        log::info!("fulfillment: ds question: {}", question);
        let summary = match self.search.search_summary(question).await {
            Ok(s) => s,
            Err(e) => {
                log::error!("fulfillment: document search failed: {}", e);
                return ANSWER_ERROR.to_string();
            }
        };
        match context
            .send_message(&prompts::datastore_prompt(&summary, question))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("fulfillment: answer generation failed: {}", e);
                ANSWER_ERROR.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::{QueryError, QueryResult, SearchError};
    use crate::llm::{Content, LlmError, Part};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        seen: Mutex<Vec<Vec<Content>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn prompt(&self, call: usize) -> String {
            let seen = self.seen.lock().unwrap();
            match seen[call].last().and_then(|c| c.parts.first()) {
                Some(Part::Text(t)) => t.clone(),
                _ => String::new(),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedModel {
        async fn generate(&self, contents: &[Content]) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(contents.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::EmptyResponse))
        }
    }

    /// Answers the schema query from a fixed table; every other query gets `data`.
    struct FakeWarehouse {
        schema: Result<QueryResult, String>,
        data: Result<QueryResult, String>,
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryExecutor for FakeWarehouse {
        async fn run_query(&self, sql: &str) -> Result<QueryResult, QueryError> {
            let outcome = if sql.contains("INFORMATION_SCHEMA.COLUMNS") {
                self.schema.clone()
            } else {
                self.executed.lock().unwrap().push(sql.to_string());
                self.data.clone()
            };
            outcome.map_err(QueryError::Api)
        }
    }

    struct FakeSearch(Result<String, String>);

    #[async_trait]
    impl DocumentSearch for FakeSearch {
        async fn search_summary(&self, _query: &str) -> Result<String, SearchError> {
            self.0.clone().map_err(SearchError::Api)
        }
    }

    fn schema() -> QueryResult {
        QueryResult::new(
            vec!["column_name".into(), "data_type".into()],
            vec![
                vec!["Category".into(), "STRING".into()],
                vec!["SellPrice".into(), "FLOAT64".into()],
                vec!["SupplierId".into(), "INT64".into()],
            ],
        )
    }

    fn warehouse(data: Result<QueryResult, String>) -> Arc<FakeWarehouse> {
        Arc::new(FakeWarehouse {
            schema: Ok(schema()),
            data,
            executed: Mutex::new(Vec::new()),
        })
    }

    fn service(model: Arc<ScriptedModel>, queries: Arc<FakeWarehouse>) -> FulfillmentService {
        FulfillmentService::new(
            model,
            queries,
            Arc::new(FakeSearch(Ok("Gemini Ultra is the most capable model.".into()))),
            FulfillmentSettings {
                project_id: "demo".into(),
                dataset: "shop".into(),
                table: "products".into(),
            },
        )
    }

    fn request(tag: Option<&str>, text: &str) -> WebhookRequest {
        serde_json::from_value(serde_json::json!({
            "fulfillmentInfo": { "tag": tag },
            "text": text,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_tag_is_rejected_without_model_call() {
        let model = ScriptedModel::new(vec![]);
        let svc = service(model.clone(), warehouse(Ok(QueryResult::default())));

        let res = svc.dispatch(&request(Some("unknown_tag"), "hola")).await;
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            serde_json::json!({"fulfillment_response":{"messages":[{"text":{"text":["Invalid webhook tag."]}}]}})
        );
        assert_eq!(model.calls(), 0);
        assert!(svc.has_context());

        let res = svc.dispatch(&request(None, "hola")).await;
        assert_eq!(res.first_text(), Some(INVALID_TAG));
    }

    #[tokio::test]
    async fn bq_answers_from_result_table() {
        let model = ScriptedModel::new(vec![
            Ok("```sql\nSELECT AVG(SellPrice) AS avg FROM shop.products\n```".into()),
            Ok("The average price is 54.5.".into()),
        ]);
        let table = QueryResult::new(vec!["avg".into()], vec![vec!["54.5".into()]]);
        let queries = warehouse(Ok(table));
        let svc = service(model.clone(), queries.clone());

        let res = svc.dispatch(&request(Some("bq_webhook"), "average price")).await;

        assert_eq!(res.first_text(), Some("The average price is 54.5."));
        assert_eq!(
            *queries.executed.lock().unwrap(),
            vec!["SELECT AVG(SellPrice) AS avg FROM shop.products".to_string()]
        );
        let sql_prompt = model.prompt(0);
        assert!(sql_prompt.contains("- Category (STRING)\n- SellPrice (FLOAT64)"));
        assert!(!sql_prompt.contains("SupplierId"));
        assert!(sql_prompt.contains("User question: average price"));
        assert!(model.prompt(1).contains("| avg |\n|:---|\n| 54.5 |"));
        // second turn carries the first exchange
        assert_eq!(model.seen.lock().unwrap()[1].len(), 3);
    }

    #[tokio::test]
    async fn failed_sql_substitutes_placeholder() {
        let model = ScriptedModel::new(vec![
            Ok("I cannot answer that.".into()),
            Ok("I don't have that information.".into()),
        ]);
        let svc = service(model.clone(), warehouse(Err("Syntax error".into())));

        let res = svc.dispatch(&request(Some("bq_webhook"), "what is the weather")).await;

        assert_eq!(res.first_text(), Some("I don't have that information."));
        let answer_prompt = model.prompt(1);
        assert!(answer_prompt.contains(NO_DATA_ANSWER));
        assert!(answer_prompt.contains("User: what is the weather"));
    }

    #[tokio::test]
    async fn schema_failure_short_circuits() {
        let model = ScriptedModel::new(vec![]);
        let queries = Arc::new(FakeWarehouse {
            schema: Err("Not found: Dataset demo:shop".into()),
            data: Ok(QueryResult::default()),
            executed: Mutex::new(Vec::new()),
        });
        let svc = service(model.clone(), queries);

        let res = svc.dispatch(&request(Some("bq_webhook"), "average price")).await;
        assert_eq!(res.first_text(), Some(SCHEMA_ERROR));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn ds_answers_from_summary() {
        let model = ScriptedModel::new(vec![Ok("Gemini Ultra.".into())]);
        let svc = service(model.clone(), warehouse(Ok(QueryResult::default())));

        let res = svc
            .dispatch(&request(Some("ds_webhook"), "Which is the most capable gemini model?"))
            .await;
        assert_eq!(res.first_text(), Some("Gemini Ultra."));
        let prompt = model.prompt(0);
        assert!(prompt.contains("Gemini Ultra is the most capable model."));
        assert!(prompt.contains("User: Which is the most capable gemini model?"));
    }

    #[tokio::test]
    async fn context_persists_across_requests() {
        let model = ScriptedModel::new(vec![Ok("first".into()), Ok("second".into())]);
        let svc = service(model.clone(), warehouse(Ok(QueryResult::default())));

        svc.dispatch(&request(Some("ds_webhook"), "one")).await;
        svc.dispatch(&request(Some("ds_webhook"), "two")).await;

        let history = &model.seen.lock().unwrap()[1];
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn model_failure_apologizes() {
        let model = ScriptedModel::new(vec![Err(LlmError::Api("500".into()))]);
        let svc = service(model, warehouse(Ok(QueryResult::default())));

        let res = svc.dispatch(&request(Some("ds_webhook"), "x")).await;
        assert_eq!(res.first_text(), Some(ANSWER_ERROR));
    }
}
