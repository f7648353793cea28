use crate::fragment::config::{
    FRAGMENT_API_KEY, FRAGMENT_API_URL, FRAGMENT_MNEMONICS, FRAGMENT_PHONE, TOKEN_FILE,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("missing fragment credentials in env")]
    MissingCredentials,
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// Session credential obtained from the provider. Shared process-wide
/// behind [`SessionStore`]; never mutated outside of `refresh`.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub token: String,
    pub obtained_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct SavedToken {
    token: String,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

/// Owner of the provider session. There is exactly one re-authentication
/// entry point, `refresh`, and the write lock serializes concurrent callers.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<ProviderSession>>,
}

impl SessionStore {
    /// Startup path: reuse the persisted token when one exists, otherwise
    /// perform a full authentication. Failure here is fatal to the process.
    pub async fn init(http: &Client) -> Result<Self, FragmentError> {
        let session = match load_saved_token() {
            Some(token) => {
                info!(target = "stardrop.fragment", "reusing persisted session token");
                ProviderSession {
                    token,
                    obtained_at: Utc::now(),
                }
            }
            None => authenticate(http).await?,
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(session)),
        })
    }

    pub async fn token(&self) -> String {
        self.inner.read().await.token.clone()
    }

    pub async fn obtained_at(&self) -> DateTime<Utc> {
        self.inner.read().await.obtained_at
    }

    /// Discard the current session and obtain a fresh one. The write lock
    /// serializes concurrent refresh attempts. Not wired into any automatic
    /// path: the provider token has no known expiry, so re-authentication
    /// happens only on explicit operator action.
    #[allow(dead_code)]
    pub async fn refresh(&self, http: &Client) -> Result<(), FragmentError> {
        let mut guard = self.inner.write().await;
        *guard = authenticate(http).await?;
        Ok(())
    }
}

/// Exchange account credentials for a session token and persist it.
pub async fn authenticate(http: &Client) -> Result<ProviderSession, FragmentError> {
    if FRAGMENT_API_KEY.is_empty() || FRAGMENT_PHONE.is_empty() || FRAGMENT_MNEMONICS.is_empty() {
        return Err(FragmentError::MissingCredentials);
    }
    let mnemonics: Vec<&str> = FRAGMENT_MNEMONICS.split_whitespace().collect();
    let payload = json!({
        "api_key": FRAGMENT_API_KEY.as_str(),
        "phone_number": FRAGMENT_PHONE.as_str(),
        "mnemonics": mnemonics,
    });
    let response = http
        .post(format!("{}/auth/authenticate/", *FRAGMENT_API_URL))
        .json(&payload)
        .send()
        .await
        .map_err(|err| FragmentError::Request(err.to_string()))?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FragmentError::AuthRejected(body));
    }

    let parsed: AuthResponse = response
        .json()
        .await
        .map_err(|err| FragmentError::Request(err.to_string()))?;
    save_token(&parsed.token);
    info!(target = "stardrop.fragment", "authenticated against fragment");
    Ok(ProviderSession {
        token: parsed.token,
        obtained_at: Utc::now(),
    })
}

fn load_saved_token() -> Option<String> {
    let raw = std::fs::read_to_string(TOKEN_FILE.as_str()).ok()?;
    let saved: SavedToken = serde_json::from_str(&raw).ok()?;
    Some(saved.token)
}

fn save_token(token: &str) {
    let saved = SavedToken {
        token: token.to_string(),
    };
    match serde_json::to_string(&saved) {
        Ok(json) => {
            if let Err(err) = std::fs::write(TOKEN_FILE.as_str(), json) {
                warn!(target = "stardrop.fragment", error = %err, "failed to persist session token");
            }
        }
        Err(err) => {
            warn!(target = "stardrop.fragment", error = %err, "failed to serialize session token");
        }
    }
}
