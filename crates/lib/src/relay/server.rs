//! Chat relay HTTP server: Telegram webhook endpoint and health probe.
//!
//! Inbound events (webhook POSTs or the getUpdates loop) go through an mpsc queue; the
//! processor task spawns one task per event so slow model calls do not block other chats.

use crate::channels::{ChannelHandle, InboundEvent, TelegramChannel, TelegramUpdate};
use crate::config::{self, Config};
use crate::google::{DialogflowClient, GoogleAuth};
use crate::llm::VertexClient;
use crate::relay::ChatRelay;
use crate::shutdown::shutdown_signal;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

const INBOUND_QUEUE: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared state for the relay endpoints.
#[derive(Clone)]
pub struct RelayState {
    /// Expected X-Telegram-Bot-Api-Secret-Token, when configured.
    pub webhook_secret: Option<String>,
    /// Sender for inbound events; the processor task receives.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
}

/// Router with `GET /` and `POST /telegram/webhook`, plus the processor task answering events.
pub fn relay_app(relay: Arc<ChatRelay>, webhook_secret: Option<String>) -> (Router, JoinHandle<()>) {
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_QUEUE);
    let processor = spawn_processor(relay, inbound_rx);
    let state = RelayState {
        webhook_secret,
        inbound_tx,
    };
    (router(state), processor)
}

fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Receive events until every sender is gone; each event is handled in its own task.
/// Once the queue closes, the task waits for replies still in flight before returning.
fn spawn_processor(relay: Arc<ChatRelay>, mut inbound_rx: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = inbound_rx.recv() => {
                    let Some(event) = event else { break };
                    let relay = relay.clone();
                    in_flight.spawn(async move {
                        relay.handle_event(event).await;
                    });
                }
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = done {
                        log::warn!("relay: event task failed: {}", e);
                    }
                }
            }
        }
        log::debug!("relay: inbound queue closed, {} replies in flight", in_flight.len());
        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                log::warn!("relay: event task failed: {}", e);
            }
        }
    })
}

/// Wait for the processor to finish outstanding replies, up to [`SHUTDOWN_GRACE`].
async fn drain(processor: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, processor).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("relay: processor task failed: {}", e),
        Err(_) => log::warn!("relay: replies still pending after {:?}, dropping them", SHUTDOWN_GRACE),
    }
}

/// Run the chat relay; binds to config.relay.bind:config.relay.port.
/// With `channels.telegram.webhookUrl` set, registers the webhook; otherwise long-polls getUpdates.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_relay(config: Config) -> Result<()> {
    let token = config::resolve_telegram_token(&config)
        .context("telegram bot token not configured (set channels.telegram.botToken or TELEGRAM_BOT_TOKEN)")?;
    let project_id = config::resolve_project_id(&config);
    if project_id.is_empty() {
        anyhow::bail!("google project id not configured (set google.projectId or GOOGLE_CLOUD_PROJECT)");
    }
    let auth = GoogleAuth::new(config::resolve_access_token(&config));
    let model = VertexClient::new(
        None,
        project_id,
        config.google.location.clone(),
        config.google.model.clone(),
        auth.clone(),
    );
    log::info!("relay: using model {}", model.model());
    let intents = DialogflowClient::new(
        None,
        config.dialogflow.agent.clone(),
        config.dialogflow.language_code.clone(),
        &config.dialogflow.location,
        auth,
    );
    let telegram = Arc::new(TelegramChannel::new(Some(token)));
    let relay = Arc::new(ChatRelay::new(
        telegram.clone(),
        Arc::new(model),
        Arc::new(intents),
        config.responses.max_response_length,
    ));

    let secret = config.channels.telegram.webhook_secret.clone();
    let (app, webhook_processor) = relay_app(relay.clone(), secret.clone());

    let webhook_url = config.channels.telegram.webhook_url.clone();
    let poll_task = if let Some(ref url) = webhook_url {
        if let Err(e) = telegram.set_webhook(url, secret.as_deref()).await {
            log::warn!("telegram set_webhook failed: {}", e);
        } else {
            log::info!("telegram channel registered (webhook mode): {}", url);
        }
        None
    } else {
        if let Err(e) = telegram.delete_webhook().await {
            log::debug!("telegram delete_webhook before polling: {}", e);
        }
        let (tx, rx) = mpsc::channel::<InboundEvent>(INBOUND_QUEUE);
        let processor = spawn_processor(relay, rx);
        let handle = telegram.clone().start_inbound(tx);
        log::info!("telegram channel registered and getUpdates loop started");
        Some((handle, processor))
    };

    let bind_addr = format!("{}:{}", config.relay.bind.trim(), config.relay.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;

    telegram.stop();
    if webhook_url.is_some() {
        if let Err(e) = telegram.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }
    // The router (and its queue sender) is dropped once serve returns.
    drain(webhook_processor).await;
    if let Some((handle, processor)) = poll_task {
        let _ = handle.await;
        drain(processor).await;
    }
    log::info!("relay stopped");
    Ok(())
}

/// POST /telegram/webhook: receives Telegram update JSON; verifies optional secret, queues the event.
async fn telegram_webhook(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            log::debug!("telegram webhook: bad update body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let Some(event) = InboundEvent::from_update(&update) else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(event).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "service": "relay",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelHandle, ContentKind, RemoteFile};
    use crate::google::{IntentDetector, IntentError};
    use crate::llm::{Content, GenerativeBackend, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelHandle for Outbox {
        fn id(&self) -> &str {
            "outbox"
        }

        fn stop(&self) {}

        async fn send_message(&self, _conversation_id: &str, text: &str) -> Result<(), String> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn fetch_file(&self, _file_id: &str) -> Result<RemoteFile, String> {
            Err("no files".into())
        }
    }

    struct Unused;

    #[async_trait]
    impl GenerativeBackend for Unused {
        async fn generate(&self, _contents: &[Content]) -> Result<String, LlmError> {
            Err(LlmError::EmptyResponse)
        }
    }

    /// Takes a while to answer so the reply is still pending when the queue closes.
    struct SlowIntents;

    #[async_trait]
    impl IntentDetector for SlowIntents {
        async fn detect_intent(&self, _session_id: &str, text: &str) -> Result<String, IntentError> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(format!("re: {}", text))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_queue_waits_for_pending_replies() {
        let outbox = Arc::new(Outbox::default());
        let relay = Arc::new(ChatRelay::new(
            outbox.clone(),
            Arc::new(Unused),
            Arc::new(SlowIntents),
            4000,
        ));
        let (tx, rx) = mpsc::channel(4);
        let processor = spawn_processor(relay, rx);

        for text in ["uno", "dos"] {
            tx.send(InboundEvent {
                channel_id: "outbox".into(),
                conversation_id: "1".into(),
                kind: ContentKind::Text(text.into()),
                caption: None,
            })
            .await
            .unwrap();
        }
        drop(tx);
        processor.await.unwrap();

        let mut sent = outbox.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["re: dos".to_string(), "re: uno".to_string()]);
    }
}
