use crate::models::{ListingFields, MarketplaceEvent, OrderDetails};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("listing {0} not found")]
    ListingNotFound(String),
}

/// Marketplace collaborator surface. Polling internals, session scraping and
/// admin command handling live on the other side of this boundary.
#[async_trait]
pub trait Marketplace: Send + Sync {
    async fn get_order(&self, order_id: &str) -> Result<OrderDetails, MarketplaceError>;
    async fn send_message(&self, chat_id: u64, text: &str) -> Result<(), MarketplaceError>;
    async fn refund(&self, order_id: &str) -> Result<(), MarketplaceError>;
    async fn get_listing(&self, listing_id: &str) -> Result<ListingFields, MarketplaceError>;
    async fn save_listing(&self, fields: &ListingFields) -> Result<(), MarketplaceError>;
}

/// Thin JSON client against the marketplace gateway.
#[derive(Clone)]
pub struct HttpMarketplace {
    base_url: String,
    auth_token: String,
    http: Client,
}

impl HttpMarketplace {
    pub fn from_env(http: Client) -> Option<Self> {
        let base_url = std::env::var("MARKETPLACE_BASE_URL").ok()?;
        let auth_token = std::env::var("MARKETPLACE_AUTH_TOKEN").ok()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Long-poll the event feed into a channel. The receiver closing (or the
    /// feed connection dying without recovery) ends the intake loop; that is
    /// the expected shutdown path for the poller.
    pub fn spawn_event_stream(&self) -> (mpsc::Receiver<MarketplaceEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut cursor = String::new();
            loop {
                match this.poll_events(&cursor).await {
                    Ok((events, next_cursor)) => {
                        cursor = next_cursor;
                        for event in events {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(target = "stardrop.marketplace", error = %err, "event poll failed");
                        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                    }
                }
            }
        });
        (rx, handle)
    }

    async fn poll_events(
        &self,
        cursor: &str,
    ) -> Result<(Vec<MarketplaceEvent>, String), MarketplaceError> {
        #[derive(serde::Deserialize)]
        struct EventPage {
            events: Vec<MarketplaceEvent>,
            cursor: String,
        }
        let response = self
            .http
            .get(self.url("/events"))
            .query(&[("cursor", cursor)])
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let page: EventPage = response
            .json()
            .await
            .map_err(|err| MarketplaceError::Deserialize(err.to_string()))?;
        Ok((page.events, page.cursor))
    }
}

#[async_trait]
impl Marketplace for HttpMarketplace {
    async fn get_order(&self, order_id: &str) -> Result<OrderDetails, MarketplaceError> {
        let response = self
            .http
            .get(self.url(&format!("/orders/{order_id}")))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if response.status() == 404 {
            return Err(MarketplaceError::OrderNotFound(order_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| MarketplaceError::Deserialize(err.to_string()))
    }

    async fn send_message(&self, chat_id: u64, text: &str) -> Result<(), MarketplaceError> {
        let response = self
            .http
            .post(self.url(&format!("/chats/{chat_id}/messages")))
            .bearer_auth(&self.auth_token)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn refund(&self, order_id: &str) -> Result<(), MarketplaceError> {
        let response = self
            .http
            .post(self.url(&format!("/orders/{order_id}/refund")))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get_listing(&self, listing_id: &str) -> Result<ListingFields, MarketplaceError> {
        let response = self
            .http
            .get(self.url(&format!("/listings/{listing_id}")))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if response.status() == 404 {
            return Err(MarketplaceError::ListingNotFound(listing_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| MarketplaceError::Deserialize(err.to_string()))
    }

    async fn save_listing(&self, fields: &ListingFields) -> Result<(), MarketplaceError> {
        let response = self
            .http
            .put(self.url(&format!("/listings/{}", fields.listing_id)))
            .bearer_auth(&self.auth_token)
            .json(&json!({
                "active": fields.active,
                "fields": fields.fields,
            }))
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// In-memory marketplace for tests: seeded orders and listings, plus a log
/// of outbound messages and refunds.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryMarketplace {
    state: std::sync::Mutex<InMemoryState>,
}

#[cfg(test)]
#[derive(Default)]
struct InMemoryState {
    orders: std::collections::HashMap<String, OrderDetails>,
    listings: std::collections::HashMap<String, ListingFields>,
    messages: Vec<(u64, String)>,
    refunds: Vec<String>,
    listing_saves: u32,
    fail_refunds: bool,
    fail_sends: bool,
}

#[cfg(test)]
impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_order(&self, order: OrderDetails) {
        let mut state = self.state.lock().expect("marketplace lock");
        state.orders.insert(order.order_id.clone(), order);
    }

    pub fn seed_listing(&self, listing: ListingFields) {
        let mut state = self.state.lock().expect("marketplace lock");
        state.listings.insert(listing.listing_id.clone(), listing);
    }

    pub fn set_fail_refunds(&self, fail: bool) {
        self.state.lock().expect("marketplace lock").fail_refunds = fail;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().expect("marketplace lock").fail_sends = fail;
    }

    pub fn messages(&self) -> Vec<(u64, String)> {
        self.state.lock().expect("marketplace lock").messages.clone()
    }

    pub fn refunds(&self) -> Vec<String> {
        self.state.lock().expect("marketplace lock").refunds.clone()
    }

    pub fn listing_saves(&self) -> u32 {
        self.state.lock().expect("marketplace lock").listing_saves
    }

    pub fn listing_active(&self, listing_id: &str) -> Option<bool> {
        self.state
            .lock()
            .expect("marketplace lock")
            .listings
            .get(listing_id)
            .map(|l| l.active)
    }
}

#[cfg(test)]
#[async_trait]
impl Marketplace for InMemoryMarketplace {
    async fn get_order(&self, order_id: &str) -> Result<OrderDetails, MarketplaceError> {
        self.state
            .lock()
            .expect("marketplace lock")
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| MarketplaceError::OrderNotFound(order_id.to_string()))
    }

    async fn send_message(&self, chat_id: u64, text: &str) -> Result<(), MarketplaceError> {
        let mut state = self.state.lock().expect("marketplace lock");
        if state.fail_sends {
            return Err(MarketplaceError::Request("message rejected".to_string()));
        }
        state.messages.push((chat_id, text.to_string()));
        Ok(())
    }

    async fn refund(&self, order_id: &str) -> Result<(), MarketplaceError> {
        let mut state = self.state.lock().expect("marketplace lock");
        if state.fail_refunds {
            return Err(MarketplaceError::Request("refund rejected".to_string()));
        }
        state.refunds.push(order_id.to_string());
        Ok(())
    }

    async fn get_listing(&self, listing_id: &str) -> Result<ListingFields, MarketplaceError> {
        self.state
            .lock()
            .expect("marketplace lock")
            .listings
            .get(listing_id)
            .cloned()
            .ok_or_else(|| MarketplaceError::ListingNotFound(listing_id.to_string()))
    }

    async fn save_listing(&self, fields: &ListingFields) -> Result<(), MarketplaceError> {
        let mut state = self.state.lock().expect("marketplace lock");
        state.listing_saves += 1;
        state
            .listings
            .insert(fields.listing_id.clone(), fields.clone());
        Ok(())
    }
}
