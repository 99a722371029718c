//! Conversational context: a multi-turn exchange with the generative model.
//!
//! The full history is resent on every turn, so earlier prompts (table schema, previous
//! answers) stay visible to the model. Turns are serialized: callers lock the session for
//! the duration of an exchange and concurrent requests queue behind it.

use crate::llm::{Content, GenerativeBackend, LlmError, Part};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared chat session with the model. History lives in process memory only.
///
/// Nothing is ever dropped from the history and every turn resends all of it, so a
/// long-lived process will eventually exceed the model's context window.
pub struct ChatSession {
    backend: Arc<dyn GenerativeBackend>,
    history: Mutex<Vec<Content>>,
}

/// Exclusive access to a [`ChatSession`]; held across all turns of one request.
pub struct Conversation<'a> {
    backend: &'a dyn GenerativeBackend,
    history: MutexGuard<'a, Vec<Content>>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Wait for exclusive use of the conversation.
    pub async fn lock(&self) -> Conversation<'_> {
        Conversation {
            backend: self.backend.as_ref(),
            history: self.history.lock().await,
        }
    }

    /// Send a single prompt as its own exchange.
    pub async fn send_message(&self, text: &str) -> Result<String, LlmError> {
        self.lock().await.send_message(text).await
    }

    /// Number of stored turns (user and model).
    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Conversation<'_> {
    /// Ask the model with the history plus `text`; on success both turns are appended.
    /// The history is only touched after the reply arrives, so a failed or cancelled turn
    /// leaves it unchanged.
    pub async fn send_message(&mut self, text: &str) -> Result<String, LlmError> {
        let user_turn = Content::user(vec![Part::text(text)]);
        let outgoing: Vec<Content> = self
            .history
            .iter()
            .cloned()
            .chain(std::iter::once(user_turn.clone()))
            .collect();
        let reply = self.backend.generate(&outgoing).await?;
        self.history.push(user_turn);
        self.history.push(Content::model_text(reply.clone()));
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Echoes the turn count and records every history it was shown.
    struct Recorder {
        seen: StdMutex<Vec<Vec<Content>>>,
        fail: bool,
    }

    #[async_trait]
    impl GenerativeBackend for Recorder {
        async fn generate(&self, contents: &[Content]) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(contents.to_vec());
            if self.fail {
                return Err(LlmError::Api("500 down".into()));
            }
            Ok(format!("reply {}", contents.len()))
        }
    }

    #[tokio::test]
    async fn history_accumulates_across_turns() {
        let backend = Arc::new(Recorder {
            seen: StdMutex::new(Vec::new()),
            fail: false,
        });
        let session = ChatSession::new(backend.clone());
        assert_eq!(session.send_message("first").await.unwrap(), "reply 1");
        assert_eq!(session.send_message("second").await.unwrap(), "reply 3");
        assert_eq!(session.len().await, 4);

        let seen = backend.seen.lock().unwrap();
        let last = &seen[1];
        assert_eq!(last[0], Content::user(vec![Part::text("first")]));
        assert_eq!(last[1].role, Role::Model);
        assert_eq!(last[2], Content::user(vec![Part::text("second")]));
    }

    #[tokio::test]
    async fn failed_turn_is_rolled_back() {
        let backend = Arc::new(Recorder {
            seen: StdMutex::new(Vec::new()),
            fail: true,
        });
        let session = ChatSession::new(backend);
        assert!(session.send_message("hello").await.is_err());
        assert!(session.is_empty().await);
    }

    /// Never answers; stands in for a model call that outlives its caller.
    struct Hanging;

    #[async_trait]
    impl GenerativeBackend for Hanging {
        async fn generate(&self, _contents: &[Content]) -> Result<String, LlmError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok("late".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_turn_leaves_history_untouched() {
        let session = ChatSession::new(Arc::new(Hanging));
        let cancelled =
            tokio::time::timeout(std::time::Duration::from_secs(5), session.send_message("q1")).await;
        assert!(cancelled.is_err());
        assert!(session.is_empty().await);
    }

    #[tokio::test]
    async fn turn_after_failure_does_not_repeat_user_role() {
        let backend = Arc::new(Recorder {
            seen: StdMutex::new(Vec::new()),
            fail: true,
        });
        let session = ChatSession::new(backend.clone());
        assert!(session.send_message("q1").await.is_err());
        assert!(session.send_message("q2").await.is_err());

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[1], vec![Content::user(vec![Part::text("q2")])]);
    }
}
