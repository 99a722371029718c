//! Vertex AI Gemini client (`generateContent`, non-streaming).
//! Binary parts are sent inline as base64 `inlineData`.

use crate::google::{regional_host, GoogleAuth};
use crate::llm::{Content, GenerativeBackend, LlmError, Part};
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Client for the Vertex AI publisher model endpoint.
#[derive(Clone)]
pub struct VertexClient {
    base_url: String,
    project_id: String,
    location: String,
    model: String,
    auth: GoogleAuth,
    client: reqwest::Client,
}

impl VertexClient {
    /// `base_url` overrides `https://<location>-aiplatform.googleapis.com` (tests, private endpoints).
    pub fn new(
        base_url: Option<String>,
        project_id: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
        auth: GoogleAuth,
    ) -> Self {
        let location = location.into();
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| regional_host("aiplatform", &location));
        Self {
            base_url,
            project_id: project_id.into(),
            location,
            model: model.into(),
            auth,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.location, self.model
        )
    }

    /// POST :generateContent with the whole conversation; returns the first candidate's text.
    pub async fn generate_content(&self, contents: &[Content]) -> Result<String, LlmError> {
        let token = self.auth.token().await?;
        let body = GenerateRequest {
            contents: contents.iter().map(WireContent::from).collect(),
        };
        log::debug!(
            "vertex: generateContent model={} turns={}",
            self.model,
            body.contents.len()
        );
        let res = self
            .client
            .post(self.generate_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(map_api_error(status, &body));
        }
        let data: GenerateResponse = res.json().await?;
        data.text().ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl GenerativeBackend for VertexClient {
    async fn generate(&self, contents: &[Content]) -> Result<String, LlmError> {
        self.generate_content(contents).await
    }
}

/// 429 and RESOURCE_EXHAUSTED become `RateLimited`; everything else is a plain API error.
fn map_api_error(status: StatusCode, body: &str) -> LlmError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let exhausted = detail
        .as_ref()
        .and_then(|d| d.status.as_deref())
        .is_some_and(|s| s == "RESOURCE_EXHAUSTED");
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.to_string());
    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        LlmError::RateLimited(format!("{} {}", status, message))
    } else {
        LlmError::Api(format!("{} {}", status, message))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<WireContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    /// Parts we never send and ignore when reading (function calls etc.).
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl From<&Content> for WireContent {
    fn from(c: &Content) -> Self {
        let parts = c
            .parts
            .iter()
            .map(|p| match p {
                Part::Text(text) => WirePart::Text { text: text.clone() },
                Part::Blob { mime_type, data } => WirePart::Inline {
                    inline_data: InlineData {
                        mime_type: mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(data),
                    },
                },
            })
            .collect();
        Self {
            role: Some(c.role.as_str().to_string()),
            parts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate, if it has any.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| match p {
                WirePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}
