//! Dialogflow CX `detectIntent` for plain text messages.

use crate::google::{regional_host, AuthError, GoogleAuth};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("dialogflow request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("dialogflow api error: {0}")]
    Api(String),
    #[error("dialogflow auth failed: {0}")]
    Auth(#[from] AuthError),
}

/// Maps a user utterance in a session to the agent's reply text.
#[async_trait]
pub trait IntentDetector: Send + Sync {
    async fn detect_intent(&self, session_id: &str, text: &str) -> Result<String, IntentError>;
}

/// Client for one Dialogflow CX agent.
#[derive(Clone)]
pub struct DialogflowClient {
    base_url: String,
    agent: String,
    language_code: String,
    auth: GoogleAuth,
    client: reqwest::Client,
}

impl DialogflowClient {
    /// `agent` is the full agent path; `location` picks the regional endpoint unless `base_url` is given.
    pub fn new(
        base_url: Option<String>,
        agent: impl Into<String>,
        language_code: impl Into<String>,
        location: &str,
        auth: GoogleAuth,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| regional_host("dialogflow", location));
        Self {
            base_url,
            agent: agent.into().trim_end_matches('/').to_string(),
            language_code: language_code.into(),
            auth,
            client: reqwest::Client::new(),
        }
    }

    fn session_path(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.agent, session_id)
    }
}

#[async_trait]
impl IntentDetector for DialogflowClient {
    /// POST /v3/{session}:detectIntent; response message texts are joined with spaces.
    async fn detect_intent(&self, session_id: &str, text: &str) -> Result<String, IntentError> {
        let url = format!("{}/v3/{}:detectIntent", self.base_url, self.session_path(session_id));
        let body = serde_json::json!({
            "queryInput": {
                "text": { "text": text },
                "languageCode": self.language_code,
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
            return Err(IntentError::Api(format!("{} {}", status, body)));
        }
        let data: DetectIntentResponse = res.json().await?;
        Ok(data.reply_text())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    #[serde(default)]
    query_result: Option<QueryResultBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultBody {
    #[serde(default)]
    response_messages: Vec<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    #[serde(default)]
    text: Vec<String>,
}

impl DetectIntentResponse {
    fn reply_text(&self) -> String {
        self.query_result
            .iter()
            .flat_map(|q| q.response_messages.iter())
            .filter_map(|m| m.text.as_ref())
            .map(|t| t.text.join(" "))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
