//! Google access tokens for the REST clients.
//!
//! A static token (config or GOOGLE_ACCESS_TOKEN) wins; otherwise the metadata server
//! (Cloud Run, GCE) and then `gcloud auth application-default print-access-token` are tried.
//! Fetched tokens are cached for 55 minutes.

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are valid for an hour; refresh five minutes early.
const TOKEN_TTL: Duration = Duration::from_secs(3600 - 300);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no google access token available: {0}")]
    Unavailable(String),
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Access token provider shared by every Google client (cheap to clone).
#[derive(Clone)]
pub struct GoogleAuth {
    static_token: Option<String>,
    cached: Arc<RwLock<Option<CachedToken>>>,
    client: reqwest::Client,
}

impl GoogleAuth {
    pub fn new(static_token: Option<String>) -> Self {
        Self {
            static_token,
            cached: Arc::new(RwLock::new(None)),
            client: reqwest::Client::new(),
        }
    }

    /// Provider that always returns the given token (tests, local runs).
    pub fn fixed(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()))
    }

    /// Bearer token for the next request.
    pub async fn token(&self) -> Result<String, AuthError> {
        if let Some(ref t) = self.static_token {
            return Ok(t.clone());
        }
        {
            let cache = self.cached.read().await;
            if let Some(ref c) = *cache {
                if c.expires_at > Instant::now() {
                    return Ok(c.token.clone());
                }
            }
        }
        let token = self.fetch_new_token().await?;
        *self.cached.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + TOKEN_TTL,
        });
        Ok(token)
    }

    async fn fetch_new_token(&self) -> Result<String, AuthError> {
        match self.fetch_from_metadata_server().await {
            Ok(t) => {
                log::debug!("google auth: token from metadata server");
                return Ok(t);
            }
            Err(e) => log::debug!("google auth: metadata server unavailable: {}", e),
        }
        match fetch_from_gcloud_cli().await {
            Ok(t) => {
                log::debug!("google auth: token from gcloud cli");
                Ok(t)
            }
            Err(e) => Err(AuthError::Unavailable(format!(
                "metadata server and gcloud both failed ({}); set GOOGLE_ACCESS_TOKEN or run `gcloud auth application-default login`",
                e
            ))),
        }
    }

    async fn fetch_from_metadata_server(&self) -> Result<String, String> {
        let res = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!("metadata server returned {}", res.status()));
        }
        let data: MetadataTokenResponse = res.json().await.map_err(|e| e.to_string())?;
        Ok(data.access_token)
    }
}

async fn fetch_from_gcloud_cli() -> Result<String, String> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "application-default", "print-access-token"])
        .output()
        .await
        .map_err(|e| format!("running gcloud: {}", e))?;
    if !output.status.success() {
        return Err(format!(
            "gcloud auth failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err("gcloud returned empty token".to_string());
    }
    Ok(token)
}

/// API host for a regional Google service: `<location>-<service>` unless location is global.
pub fn regional_host(service: &str, location: &str) -> String {
    let loc = location.trim();
    if loc.is_empty() || loc == "global" {
        format!("https://{}.googleapis.com", service)
    } else {
        format!("https://{}-{}.googleapis.com", loc, service)
    }
}
