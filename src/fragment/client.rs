use crate::fragment::auth::SessionStore;
use crate::fragment::config::FRAGMENT_API_URL;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::warn;

/// Result of the core side-effecting call. Transport errors surface as
/// `delivered = false` with the error text as the raw response, so the
/// caller has a single failure path to classify.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    pub raw_response: String,
}

/// Star-delivery provider surface, as consumed by the pipeline. The real
/// implementation is [`FragmentClient`]; tests use an in-memory double.
#[async_trait]
pub trait StarsProvider: Send + Sync {
    /// Existence probe for a delivery handle. Fails closed: any transport
    /// error or non-200 response means "does not exist".
    async fn username_exists(&self, target: &str) -> bool;

    async fn deliver(&self, target: &str, quantity: u32) -> DeliveryOutcome;

    /// Informational only; returns 0 on any failure.
    async fn wallet_balance(&self) -> i64;
}

#[derive(Clone)]
pub struct FragmentClient {
    http: Client,
    session: SessionStore,
}

impl FragmentClient {
    pub fn new(http: Client, session: SessionStore) -> Self {
        Self { http, session }
    }

    async fn auth_header(&self) -> String {
        format!("JWT {}", self.session.token().await)
    }
}

#[async_trait]
impl StarsProvider for FragmentClient {
    async fn username_exists(&self, target: &str) -> bool {
        let url = format!(
            "{}/misc/user/{}/",
            *FRAGMENT_API_URL,
            target.trim_start_matches('@')
        );
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("Authorization", self.auth_header().await)
            .send()
            .await;
        match response {
            Ok(res) if res.status().is_success() => res
                .json::<Value>()
                .await
                .map(|data| data.get("username").is_some())
                .unwrap_or(false),
            Ok(_) => false,
            Err(err) => {
                warn!(target = "stardrop.fragment", error = %err, "username probe failed");
                false
            }
        }
    }

    async fn deliver(&self, target: &str, quantity: u32) -> DeliveryOutcome {
        let payload = json!({
            "username": target.trim_start_matches('@'),
            "quantity": quantity,
            "show_sender": false,
        });
        let response = self
            .http
            .post(format!("{}/order/stars/", *FRAGMENT_API_URL))
            .header("Authorization", self.auth_header().await)
            .json(&payload)
            .send()
            .await;
        match response {
            Ok(res) => {
                let delivered = res.status().is_success();
                let raw_response = res.text().await.unwrap_or_default();
                DeliveryOutcome {
                    delivered,
                    raw_response,
                }
            }
            Err(err) => DeliveryOutcome {
                delivered: false,
                raw_response: err.to_string(),
            },
        }
    }

    async fn wallet_balance(&self) -> i64 {
        let response = self
            .http
            .get(format!("{}/misc/wallet/", *FRAGMENT_API_URL))
            .header("Accept", "application/json")
            .header("Authorization", self.auth_header().await)
            .send()
            .await;
        match response {
            Ok(res) if res.status().is_success() => res
                .json::<Value>()
                .await
                .ok()
                .and_then(|data| data.get("balance").and_then(Value::as_i64))
                .unwrap_or(0),
            Ok(res) => {
                warn!(target = "stardrop.fragment", status = %res.status(), "balance lookup failed");
                0
            }
            Err(err) => {
                warn!(target = "stardrop.fragment", error = %err, "balance lookup failed");
                0
            }
        }
    }
}

/// In-memory provider for tests: scripted delivery outcomes, a fixed set of
/// known usernames, and a log of delivery calls with their instants.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryStarsProvider {
    known_usernames: std::collections::HashSet<String>,
    failure_response: Option<String>,
    deliveries: std::sync::Mutex<Vec<DeliveryRecord>>,
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub target: String,
    pub quantity: u32,
    pub at: std::time::Instant,
}

#[cfg(test)]
impl InMemoryStarsProvider {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Every delivery fails with the given raw provider response.
    pub fn failing_with(raw_response: &str) -> Self {
        Self {
            failure_response: Some(raw_response.to_string()),
            ..Self::default()
        }
    }

    pub fn with_known_username(mut self, target: &str) -> Self {
        self.known_usernames
            .insert(target.trim_start_matches('@').to_string());
        self
    }

    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().expect("deliveries lock").clone()
    }
}

#[cfg(test)]
#[async_trait]
impl StarsProvider for InMemoryStarsProvider {
    async fn username_exists(&self, target: &str) -> bool {
        self.known_usernames
            .contains(target.trim_start_matches('@'))
    }

    async fn deliver(&self, target: &str, quantity: u32) -> DeliveryOutcome {
        self.deliveries
            .lock()
            .expect("deliveries lock")
            .push(DeliveryRecord {
                target: target.to_string(),
                quantity,
                at: std::time::Instant::now(),
            });
        match &self.failure_response {
            Some(raw) => DeliveryOutcome {
                delivered: false,
                raw_response: raw.clone(),
            },
            None => DeliveryOutcome {
                delivered: true,
                raw_response: "{}".to_string(),
            },
        }
    }

    async fn wallet_balance(&self) -> i64 {
        0
    }
}
