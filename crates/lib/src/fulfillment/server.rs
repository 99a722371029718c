//! Fulfillment HTTP server: webhook endpoint and health probe.

use crate::config::{self, Config};
use crate::fulfillment::{FulfillmentService, FulfillmentSettings, WebhookRequest, WebhookResponse};
use crate::google::{BigQueryClient, DiscoveryEngineClient, GoogleAuth};
use crate::llm::VertexClient;
use crate::shutdown::shutdown_signal;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Router with `GET /` (health) and the webhook on both `POST /` and `POST /webhook`.
pub fn fulfillment_app(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .route("/", get(health_http).post(webhook))
        .route("/webhook", post(webhook))
        .with_state(service)
}

/// Run the fulfillment webhook; binds to config.fulfillment.bind:config.fulfillment.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_fulfillment(config: Config) -> Result<()> {
    let project_id = config::resolve_project_id(&config);
    if project_id.is_empty() {
        anyhow::bail!("google project id not configured (set google.projectId or GOOGLE_CLOUD_PROJECT)");
    }
    let f = &config.fulfillment;
    if f.bq_dataset.is_empty() || f.bq_table.is_empty() {
        log::warn!("fulfillment: bqDataset/bqTable not set; bq_webhook requests will fail");
    }
    if f.datastore_id.is_empty() {
        log::warn!("fulfillment: datastoreId not set; ds_webhook requests will fail");
    }
    let auth = GoogleAuth::new(config::resolve_access_token(&config));
    let model = VertexClient::new(
        None,
        project_id.clone(),
        config.google.location.clone(),
        config.google.model.clone(),
        auth.clone(),
    );
    log::info!("fulfillment: using model {}", model.model());
    let queries = BigQueryClient::new(None, project_id.clone(), auth.clone());
    let search = DiscoveryEngineClient::new(
        None,
        project_id.clone(),
        f.datastore_location.clone(),
        f.datastore_id.clone(),
        auth,
    );
    let service = Arc::new(FulfillmentService::new(
        Arc::new(model),
        Arc::new(queries),
        Arc::new(search),
        FulfillmentSettings {
            project_id,
            dataset: f.bq_dataset.clone(),
            table: f.bq_table.clone(),
        },
    ));

    let bind_addr = format!("{}:{}", f.bind.trim(), f.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("fulfillment webhook listening on {}", bind_addr);
    axum::serve(listener, fulfillment_app(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("fulfillment server exited")?;
    log::info!("fulfillment stopped");
    Ok(())
}

/// POST / and POST /webhook: Dialogflow CX fulfillment request in, fulfillment response out.
async fn webhook(
    State(service): State<Arc<FulfillmentService>>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let req: WebhookRequest = serde_json::from_slice(&body).map_err(|e| {
        log::debug!("fulfillment: bad request body: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    Ok(Json(service.dispatch(&req).await))
}

/// GET / returns a simple health JSON (for probes).
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "service": "fulfillment",
    }))
}
