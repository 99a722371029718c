//! Bounded retry around a rate-limited generative backend.
//!
//! Only rate-limit errors are retried, with a constant pause between attempts. Anything else
//! ends the call on the spot so callers can answer the user right away.

use crate::llm::{Content, GenerativeBackend, LlmError, Part};
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Appended to replies cut at the configured maximum length.
pub const TRUNCATION_MARKER: &str = "...(description truncated)";

/// Reply sent when every attempt was rate limited.
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, the service is temporarily unavailable. Please try again later.";

/// Attempt budget and the fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Every attempt was rate limited.
    #[error("model still rate limited after {attempts} attempts")]
    Exhausted { attempts: u32 },
    /// A non-retryable failure; no further attempts were made.
    #[error(transparent)]
    Fatal(LlmError),
}

/// Send `parts` as one user turn, retrying rate-limit failures per `policy`.
pub async fn generate_with_retry(
    backend: &dyn GenerativeBackend,
    parts: Vec<Part>,
    policy: RetryPolicy,
) -> Result<String, RetryError> {
    let contents = [Content::user(parts)];
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        log::info!("model call: attempt {}/{}", attempt, max_attempts);
        match backend.generate(&contents).await {
            Ok(text) => {
                log::info!("model call: attempt {} succeeded", attempt);
                return Ok(text);
            }
            Err(e) if e.is_rate_limited() => {
                if attempt == max_attempts {
                    log::warn!("model call: attempt {} rate limited, giving up: {}", attempt, e);
                    break;
                }
                log::warn!(
                    "model call: attempt {} rate limited, retrying in {:?}: {}",
                    attempt,
                    policy.delay,
                    e
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                log::error!("model call: attempt {} failed, not retrying: {}", attempt, e);
                return Err(RetryError::Fatal(e));
            }
        }
    }
    log::error!("model call: rate limited on all {} attempts", max_attempts);
    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}

/// Cut `text` to `max_chars` characters and append [`TRUNCATION_MARKER`] when it is longer.
pub fn truncate_response(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}
