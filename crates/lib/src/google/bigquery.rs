//! BigQuery `jobs.query` client returning rows as strings.

use crate::google::{AuthError, GoogleAuth};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";
const QUERY_TIMEOUT_MS: u64 = 30_000;
/// getQueryResults polls after the initial call before giving up on a running job.
const MAX_POLLS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("bigquery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bigquery api error: {0}")]
    Api(String),
    #[error("bigquery job did not finish: {0}")]
    Incomplete(String),
    #[error("bigquery auth failed: {0}")]
    Auth(#[from] AuthError),
}

/// Tabular query output. Every cell is rendered as text; NULL becomes an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Index of a column by exact name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// GitHub-flavored Markdown table (header, separator, one line per row).
    pub fn to_markdown(&self) -> String {
        let row_line = |cells: &[String]| {
            let cells: Vec<String> = cells.iter().map(|c| escape_cell(c)).collect();
            format!("| {} |", cells.join(" | "))
        };
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(row_line(&self.columns));
        lines.push(format!(
            "|{}|",
            self.columns.iter().map(|_| ":---").collect::<Vec<_>>().join("|")
        ));
        for row in &self.rows {
            lines.push(row_line(row));
        }
        lines.join("\n")
    }
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

/// Runs SQL and returns the result table.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, QueryError>;
}

/// BigQuery REST client bound to one billing project.
#[derive(Clone)]
pub struct BigQueryClient {
    base_url: String,
    project_id: String,
    auth: GoogleAuth,
    client: reqwest::Client,
}

impl BigQueryClient {
    pub fn new(base_url: Option<String>, project_id: impl Into<String>, auth: GoogleAuth) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            project_id: project_id.into(),
            auth,
            client: reqwest::Client::new(),
        }
    }

    async fn parse(res: reqwest::Response) -> Result<QueryResponse, QueryError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(QueryError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }

    /// GET queries/{jobId} until the job completes or the poll budget runs out.
    async fn wait_for_job(&self, mut data: QueryResponse) -> Result<QueryResponse, QueryError> {
        let mut polls = 0;
        while !data.job_complete {
            let job = data
                .job_reference
                .as_ref()
                .ok_or_else(|| QueryError::Incomplete("no job reference".to_string()))?;
            if polls >= MAX_POLLS {
                return Err(QueryError::Incomplete(job.job_id.clone()));
            }
            polls += 1;
            log::debug!("bigquery: job {} still running, poll {}", job.job_id, polls);
            let url = format!(
                "{}/bigquery/v2/projects/{}/queries/{}",
                self.base_url, self.project_id, job.job_id
            );
            let mut query: Vec<(&str, String)> = vec![("timeoutMs", QUERY_TIMEOUT_MS.to_string())];
            if let Some(ref loc) = job.location {
                query.push(("location", loc.clone()));
            }
            let token = self.auth.token().await?;
            let res = self
                .client
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .timeout(Duration::from_millis(QUERY_TIMEOUT_MS + 5_000))
                .send()
                .await?;
            data = Self::parse(res).await?;
        }
        Ok(data)
    }
}

#[async_trait]
impl QueryExecutor for BigQueryClient {
    /// POST /bigquery/v2/projects/{project}/queries (standard SQL).
    async fn run_query(&self, sql: &str) -> Result<QueryResult, QueryError> {
        let url = format!("{}/bigquery/v2/projects/{}/queries", self.base_url, self.project_id);
        let body = serde_json::json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });
        let token = self.auth.token().await?;
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let data = Self::parse(res).await?;
        let data = self.wait_for_job(data).await?;
        data.into_result()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

impl QueryResponse {
    /// `errors` may hold warnings on a successful job; it only fails the query when the job
    /// finished without a result schema.
    fn into_result(self) -> Result<QueryResult, QueryError> {
        if let Some(first) = self.errors.first() {
            if self.schema.is_none() {
                return Err(QueryError::Api(first.message.clone()));
            }
            for e in &self.errors {
                log::warn!("bigquery: job reported: {}", e.message);
            }
        }
        let columns = self
            .schema
            .map(|s| s.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default();
        let rows = self
            .rows
            .into_iter()
            .map(|r| r.f.into_iter().map(|c| cell_text(c.v)).collect())
            .collect();
        Ok(QueryResult { columns, rows })
    }
}

fn cell_text(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
