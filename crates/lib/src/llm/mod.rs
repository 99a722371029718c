//! Generative model abstraction and the Vertex AI Gemini client.
//!
//! A request is an ordered list of [`Part`]s grouped into [`Content`] turns. The backend
//! trait is the seam the relay and the fulfillment webhook are tested against.

mod vertex;

pub use vertex::VertexClient;

use async_trait::async_trait;

/// One unit of a multimodal request: instruction text or a binary payload with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Blob { mime_type: String, data: Vec<u8> },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn blob(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Part::Blob {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Backend signalled over-quota (HTTP 429 / RESOURCE_EXHAUSTED).
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model api error: {0}")]
    Api(String),
    #[error("model returned no text")]
    EmptyResponse,
    #[error("model auth failed: {0}")]
    Auth(#[from] crate::google::AuthError),
}

impl LlmError {
    /// True when the call may succeed if repeated after a pause.
    ///
    /// Unstructured errors that still carry a 429 in their text are treated the same way,
    /// so proxies that rewrap the status do not turn a quota hit into a hard failure.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::Api(msg) => msg.contains("429"),
            LlmError::Request(e) => e.status().map(|s| s.as_u16()) == Some(429),
            _ => false,
        }
    }
}

/// A generative model that turns a conversation into one text reply.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, contents: &[Content]) -> Result<String, LlmError>;
}
