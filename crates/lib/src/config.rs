//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.gembot/config.json`) and environment.
//! Secrets and deployment identifiers can be supplied through env so the same file works
//! locally and on Cloud Run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat relay server settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Fulfillment webhook server settings and data sources.
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Google Cloud project, Vertex AI location and model.
    #[serde(default)]
    pub google: GoogleConfig,

    /// Dialogflow CX agent used for text messages.
    #[serde(default)]
    pub dialogflow: DialogflowConfig,

    /// Reply shaping.
    #[serde(default)]
    pub responses: ResponsesConfig,
}

/// Chat relay bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Port for the Telegram webhook endpoint (default 8080).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

/// Fulfillment webhook bind, port, and the BigQuery / datastore it answers from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentConfig {
    /// Port for the webhook (default 8080).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_bind")]
    pub bind: String,

    /// BigQuery dataset holding the product table.
    #[serde(default)]
    pub bq_dataset: String,

    /// BigQuery table queried by `bq_webhook`.
    #[serde(default)]
    pub bq_table: String,

    /// Vertex AI Search datastore id used by `ds_webhook`.
    #[serde(default)]
    pub datastore_id: String,

    /// Datastore location (default "global").
    #[serde(default = "default_global")]
    pub datastore_location: String,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            bq_dataset: String::new(),
            bq_table: String::new(),
            datastore_id: String::new(),
            datastore_location: default_global(),
        }
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// Google Cloud settings shared by every Google client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// Project id. Overridden by GOOGLE_CLOUD_PROJECT env when set.
    #[serde(default)]
    pub project_id: String,
    /// Vertex AI location (default "us-central1").
    #[serde(default = "default_location")]
    pub location: String,
    /// Gemini model name (default "gemini-1.5-flash-002").
    #[serde(default = "default_model")]
    pub model: String,
    /// Static OAuth access token. Overridden by GOOGLE_ACCESS_TOKEN env. When absent the
    /// metadata server and then the gcloud CLI are asked for one.
    pub access_token: Option<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: default_location(),
            model: default_model(),
            access_token: None,
        }
    }
}

/// Dialogflow CX agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogflowConfig {
    /// Full agent path: `projects/<p>/locations/<l>/agents/<id>`.
    #[serde(default)]
    pub agent: String,
    /// Language code sent with every query (default "es").
    #[serde(default = "default_language_code")]
    pub language_code: String,
    /// Agent location; anything but "global" selects the regional endpoint.
    #[serde(default = "default_global")]
    pub location: String,
}

impl Default for DialogflowConfig {
    fn default() -> Self {
        Self {
            agent: String::new(),
            language_code: default_language_code(),
            location: default_global(),
        }
    }
}

/// Reply shaping for model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesConfig {
    /// Model replies longer than this many characters are truncated (default 4000).
    #[serde(default = "default_max_response_length")]
    pub max_response_length: usize,
}

impl Default for ResponsesConfig {
    fn default() -> Self {
        Self {
            max_response_length: default_max_response_length(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_global() -> String {
    "global".to_string()
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash-002".to_string()
}

fn default_language_code() -> String {
    "es".to_string()
}

fn default_max_response_length() -> usize {
    4000
}

/// Non-empty trimmed value of an env var.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_non_empty("TELEGRAM_BOT_TOKEN")
        .or_else(|| trimmed(config.channels.telegram.bot_token.as_ref()))
}

/// Resolve a static Google access token: env GOOGLE_ACCESS_TOKEN overrides config.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    env_non_empty("GOOGLE_ACCESS_TOKEN").or_else(|| trimmed(config.google.access_token.as_ref()))
}

/// Resolve the project id: env GOOGLE_CLOUD_PROJECT overrides config.
pub fn resolve_project_id(config: &Config) -> String {
    env_non_empty("GOOGLE_CLOUD_PROJECT").unwrap_or_else(|| config.google.project_id.trim().to_string())
}

/// Port from env PORT (set by Cloud Run), if valid.
pub fn port_from_env() -> Option<u16> {
    env_non_empty("PORT").and_then(|p| p.parse().ok())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("GEMBOT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".gembot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, GEMBOT_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
