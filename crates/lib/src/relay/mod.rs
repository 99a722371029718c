//! Chat relay: answer one inbound chat event.
//!
//! Text goes to Dialogflow intent detection (single attempt). Images, voice and video are
//! downloaded once and sent to Gemini through the retrying model call. Every failure is
//! logged and turned into a fixed reply; nothing is propagated to the channel transport.

pub mod media;
mod server;

pub use server::{relay_app, run_relay, RelayState};

use crate::channels::{ChannelHandle, ContentKind, InboundEvent};
use crate::google::IntentDetector;
use crate::llm::{GenerativeBackend, Part};
use crate::retry::{self, RetryError, RetryPolicy, UNAVAILABLE_MESSAGE};
use std::sync::Arc;

pub const TEXT_ERROR: &str = "Sorry, I couldn't understand that. Please try again.";
pub const IMAGE_ERROR: &str = "Sorry, there was an error processing your image.";
pub const AUDIO_ERROR: &str = "Sorry, there was an error processing your audio.";
pub const VIDEO_ERROR: &str = "Sorry, there was an error processing your video.";

/// Dependencies for answering chat events.
pub struct ChatRelay {
    channel: Arc<dyn ChannelHandle>,
    model: Arc<dyn GenerativeBackend>,
    intents: Arc<dyn IntentDetector>,
    max_response_length: usize,
    retry: RetryPolicy,
}

impl ChatRelay {
    pub fn new(
        channel: Arc<dyn ChannelHandle>,
        model: Arc<dyn GenerativeBackend>,
        intents: Arc<dyn IntentDetector>,
        max_response_length: usize,
    ) -> Self {
        Self {
            channel,
            model,
            intents,
            max_response_length,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Compute the reply and send it to the originating conversation.
    pub async fn handle_event(&self, event: InboundEvent) {
        log::info!(
            "relay: received {} message in {}",
            event.kind.label(),
            event.conversation_id
        );
        let reply = self.reply_for(&event).await;
        if reply.trim().is_empty() {
            log::debug!("relay: empty reply for {}, nothing sent", event.conversation_id);
            return;
        }
        if let Err(e) = self.channel.send_message(&event.conversation_id, &reply).await {
            log::warn!("relay: send_message to {} failed: {}", event.conversation_id, e);
        }
    }

    /// Reply text for one event; always returns a user-facing string.
    pub async fn reply_for(&self, event: &InboundEvent) -> String {
        let caption = event.caption.as_deref();
        match &event.kind {
            ContentKind::Text(text) => self.handle_text(&event.conversation_id, text).await,
            ContentKind::Image { file_id } => {
                self.handle_media(file_id, IMAGE_ERROR, |file| media::image_request(file, caption))
                    .await
            }
            ContentKind::Audio { file_id, mime_type } => {
                let mime = mime_type.as_deref();
                self.handle_media(file_id, AUDIO_ERROR, |file| media::audio_request(file, mime))
                    .await
            }
            ContentKind::Video { file_id } => {
                self.handle_media(file_id, VIDEO_ERROR, |file| media::video_request(file, caption))
                    .await
            }
        }
    }

    async fn handle_text(&self, conversation_id: &str, text: &str) -> String {
        match self.intents.detect_intent(conversation_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("relay: detect intent failed: {}", e);
                TEXT_ERROR.to_string()
            }
        }
    }

    async fn handle_media<F>(&self, file_id: &str, apology: &str, build: F) -> String
    where
        F: FnOnce(crate::channels::RemoteFile) -> Vec<Part>,
    {
        let file = match self.channel.fetch_file(file_id).await {
            Ok(f) => f,
            Err(e) => {
                log::error!("relay: fetching file {} failed: {}", file_id, e);
                return apology.to_string();
            }
        };
        let parts = build(file);
        match retry::generate_with_retry(self.model.as_ref(), parts, self.retry).await {
            Ok(text) => retry::truncate_response(&text, self.max_response_length),
            Err(RetryError::Exhausted { attempts }) => {
                log::error!("relay: model unavailable after {} attempts", attempts);
                UNAVAILABLE_MESSAGE.to_string()
            }
            Err(RetryError::Fatal(e)) => {
                log::error!("relay: model call failed: {}", e);
                apology.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::RemoteFile;
    use crate::google::IntentError;
    use crate::llm::{Content, LlmError};
    use crate::retry::TRUNCATION_MARKER;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeChannel {
        sent: Mutex<Vec<(String, String)>>,
        fail_fetch: bool,
    }

    #[async_trait]
    impl ChannelHandle for FakeChannel {
        fn id(&self) -> &str {
            "fake"
        }

        fn stop(&self) {}

        async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn fetch_file(&self, file_id: &str) -> Result<RemoteFile, String> {
            if self.fail_fetch {
                return Err("connection reset".to_string());
            }
            Ok(RemoteFile {
                file_path: format!("media/{}.png", file_id),
                data: vec![7, 7, 7],
            })
        }
    }

    struct ScriptedModel {
        outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Mutex<Vec<Vec<Content>>>,
    }

    impl ScriptedModel {
        fn new(outcomes: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedModel {
        async fn generate(&self, contents: &[Content]) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(contents.to_vec());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Api("unexpected call".into())))
        }
    }

    struct FixedIntents(Result<String, String>);

    #[async_trait]
    impl IntentDetector for FixedIntents {
        async fn detect_intent(&self, _session_id: &str, _text: &str) -> Result<String, IntentError> {
            self.0.clone().map_err(IntentError::Api)
        }
    }

    fn limited() -> Result<String, LlmError> {
        Err(LlmError::RateLimited("429".into()))
    }

    fn image_event(caption: Option<&str>) -> InboundEvent {
        InboundEvent {
            channel_id: "telegram".into(),
            conversation_id: "42".into(),
            kind: ContentKind::Image { file_id: "p1".into() },
            caption: caption.map(String::from),
        }
    }

    fn relay(channel: Arc<FakeChannel>, model: Arc<ScriptedModel>, max: usize) -> ChatRelay {
        ChatRelay::new(channel, model, Arc::new(FixedIntents(Ok("hola".into()))), max)
    }

    #[tokio::test(start_paused = true)]
    async fn image_after_rate_limits_replies_with_model_text() {
        let channel = Arc::new(FakeChannel::default());
        let model = ScriptedModel::new(vec![limited(), limited(), Ok("A red bicycle.".into())]);
        let relay = relay(channel.clone(), model.clone(), 4000);

        relay.handle_event(image_event(Some("What is this?"))).await;

        assert_eq!(
            *channel.sent.lock().unwrap(),
            vec![("42".to_string(), "A red bicycle.".to_string())]
        );
        assert_eq!(model.calls(), 3);
        let first = &model.requests.lock().unwrap()[0][0];
        assert_eq!(
            first.parts,
            vec![
                Part::text(media::IMAGE_PROMPT),
                Part::blob("image/png", vec![7, 7, 7]),
                Part::text("Instruction: What is this?"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_reply_unavailable() {
        let channel = Arc::new(FakeChannel::default());
        let model = ScriptedModel::new(vec![limited(), limited(), limited()]);
        let relay = relay(channel.clone(), model.clone(), 4000);

        relay.handle_event(image_event(None)).await;

        assert_eq!(channel.sent.lock().unwrap()[0].1, UNAVAILABLE_MESSAGE);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn non_rate_limit_error_apologizes_after_one_attempt() {
        let channel = Arc::new(FakeChannel::default());
        let model = ScriptedModel::new(vec![Err(LlmError::Api("400 invalid argument".into()))]);
        let relay = relay(channel.clone(), model.clone(), 4000);

        let event = InboundEvent {
            kind: ContentKind::Video { file_id: "v".into() },
            ..image_event(Some("resume"))
        };
        assert_eq!(relay.reply_for(&event).await, VIDEO_ERROR);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn long_reply_is_truncated() {
        let channel = Arc::new(FakeChannel::default());
        let model = ScriptedModel::new(vec![Ok("x".repeat(30))]);
        let relay = relay(channel, model, 10);

        let reply = relay.reply_for(&image_event(None)).await;
        assert_eq!(reply, format!("{}{}", "x".repeat(10), TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn download_failure_apologizes_without_model_call() {
        let channel = Arc::new(FakeChannel {
            fail_fetch: true,
            ..Default::default()
        });
        let model = ScriptedModel::new(vec![]);
        let relay = relay(channel, model.clone(), 4000);

        let event = InboundEvent {
            kind: ContentKind::Audio {
                file_id: "a".into(),
                mime_type: Some("audio/ogg".into()),
            },
            ..image_event(None)
        };
        assert_eq!(relay.reply_for(&event).await, AUDIO_ERROR);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn text_goes_to_intent_detection_only() {
        let channel = Arc::new(FakeChannel::default());
        let model = ScriptedModel::new(vec![]);
        let relay = relay(channel.clone(), model.clone(), 4000);

        let event = InboundEvent {
            kind: ContentKind::Text("hola".into()),
            ..image_event(None)
        };
        relay.handle_event(event).await;
        assert_eq!(channel.sent.lock().unwrap()[0].1, "hola");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn intent_failure_replies_with_fixed_text() {
        let channel = Arc::new(FakeChannel::default());
        let relay = ChatRelay::new(
            channel,
            ScriptedModel::new(vec![]),
            Arc::new(FixedIntents(Err("503".into()))),
            4000,
        );
        let event = InboundEvent {
            kind: ContentKind::Text("hola".into()),
            ..image_event(None)
        };
        assert_eq!(relay.reply_for(&event).await, TEXT_ERROR);
    }
}
