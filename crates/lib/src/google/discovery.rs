//! Vertex AI Search (Discovery Engine) datastore search, summary only.

use crate::google::{regional_host, AuthError, GoogleAuth};
use async_trait::async_trait;
use serde::Deserialize;

const PAGE_SIZE: u32 = 10;
const SUMMARY_RESULT_COUNT: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search api error: {0}")]
    Api(String),
    #[error("search auth failed: {0}")]
    Auth(#[from] AuthError),
}

/// Looks up a question in a document collection and returns a summary snippet.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search_summary(&self, query: &str) -> Result<String, SearchError>;
}

/// Client for one datastore's default serving config.
#[derive(Clone)]
pub struct DiscoveryEngineClient {
    base_url: String,
    project_id: String,
    location: String,
    datastore_id: String,
    auth: GoogleAuth,
    client: reqwest::Client,
}

impl DiscoveryEngineClient {
    pub fn new(
        base_url: Option<String>,
        project_id: impl Into<String>,
        location: impl Into<String>,
        datastore_id: impl Into<String>,
        auth: GoogleAuth,
    ) -> Self {
        let location = location.into();
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| regional_host("discoveryengine", &location));
        Self {
            base_url,
            project_id: project_id.into(),
            location,
            datastore_id: datastore_id.into(),
            auth,
            client: reqwest::Client::new(),
        }
    }

    fn serving_config(&self) -> String {
        format!(
            "projects/{}/locations/{}/collections/default_collection/dataStores/{}/servingConfigs/default_config",
            self.project_id, self.location, self.datastore_id
        )
    }
}

#[async_trait]
impl DocumentSearch for DiscoveryEngineClient {
    /// POST /v1/{servingConfig}:search with a summary spec; returns `summary.summaryText`.
    async fn search_summary(&self, query: &str) -> Result<String, SearchError> {
        let url = format!("{}/v1/{}:search", self.base_url, self.serving_config());
        let body = serde_json::json!({
            "query": query,
            "pageSize": PAGE_SIZE,
            "queryExpansionSpec": { "condition": "AUTO" },
            "spellCorrectionSpec": { "mode": "AUTO" },
            "contentSearchSpec": {
                "summarySpec": {
                    "summaryResultCount": SUMMARY_RESULT_COUNT,
                    "includeCitations": true,
                    "ignoreAdversarialQuery": true,
                    "ignoreNonSummarySeekingQuery": true
                }
            }
        });
        let token = self.auth.token().await?;
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SearchError::Api(format!("{} {}", status, body)));
        }
        let data: SearchResponse = res.json().await?;
        Ok(data
            .summary
            .and_then(|s| s.summary_text)
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    summary: Option<Summary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    #[serde(default)]
    summary_text: Option<String>,
}
