use crate::clarify::{ClarificationState, ClarificationTracker, PendingClarification};
use crate::extract::{self, Extraction};
use crate::fragment::StarsProvider;
use crate::fragment::config::MIN_STARS_PER_ORDER;
use crate::marketplace::{Marketplace, MarketplaceError};
use crate::models::{MarketplaceEvent, OrderDetails, QueueItem};
use crate::notify::Notifier;
use crate::queue::FulfillmentQueue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info};

#[derive(Debug, Error)]
enum EventError {
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error("fulfillment queue closed")]
    QueueClosed,
}

/// Minimum spacing between consecutive outbound replies, so a burst of
/// events cannot produce rapid-fire messages. Separate from the queue's
/// inter-delivery cooldown.
pub struct ReplyThrottle {
    min_gap: Duration,
    last: Mutex<Option<Instant>>,
}

impl ReplyThrottle {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: Mutex::new(None),
        }
    }

    pub async fn pace(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_gap {
                sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Consumes marketplace events: resolves delivery parameters for new orders
/// (asking the buyer when the metadata lacks a target) and feeds resolved
/// orders to the fulfillment queue.
pub struct EventHandler {
    marketplace: Arc<dyn Marketplace>,
    provider: Arc<dyn StarsProvider>,
    notifier: Arc<dyn Notifier>,
    tracker: ClarificationTracker,
    queue: FulfillmentQueue,
    throttle: ReplyThrottle,
    /// Only orders from this marketplace category are fulfilled.
    category_id: Option<String>,
    /// Our own account id; replies authored by us are skipped.
    self_id: Option<u64>,
}

impl EventHandler {
    pub fn new(
        marketplace: Arc<dyn Marketplace>,
        provider: Arc<dyn StarsProvider>,
        notifier: Arc<dyn Notifier>,
        queue: FulfillmentQueue,
        throttle: ReplyThrottle,
        category_id: Option<String>,
        self_id: Option<u64>,
    ) -> Self {
        Self {
            marketplace,
            provider,
            notifier,
            tracker: ClarificationTracker::new(),
            queue,
            throttle,
            category_id,
            self_id,
        }
    }

    /// Per-event boundary: failures are logged here and never abort the
    /// intake loop.
    pub async fn handle(&self, event: MarketplaceEvent) {
        let result = match event {
            MarketplaceEvent::NewOrder { order_id } => {
                crate::metrics::inc_events("new_order");
                self.handle_new_order(&order_id).await
            }
            MarketplaceEvent::NewMessage {
                chat_id,
                author_id,
                text,
            } => {
                crate::metrics::inc_events("new_message");
                self.handle_new_message(chat_id, author_id, &text).await
            }
        };
        if let Err(err) = result {
            error!(target = "stardrop.events", error = %err, "event processing failed");
        }
    }

    async fn handle_new_order(&self, order_id: &str) -> Result<(), EventError> {
        let details = self.marketplace.get_order(order_id).await?;

        if let Some(expected) = &self.category_id
            && details.category_id.as_deref() != Some(expected.as_str())
        {
            info!(
                target = "stardrop.events",
                order_id = %order_id,
                category_id = details.category_id.as_deref().unwrap_or("unknown"),
                "skipping order outside the fulfillment category",
            );
            return Ok(());
        }

        self.notifier
            .notify(&format!("📦 Новый заказ {order_id}"), false)
            .await;

        let extraction = extract_details(&details);
        let per_unit = extraction.quantity.unwrap_or(MIN_STARS_PER_ORDER);
        // Marketplace metadata is untrusted; an absurd lot count saturates
        // instead of overflowing. The provider rejects oversized orders.
        let quantity = per_unit.saturating_mul(details.lot_quantity.max(1));

        let Some(target) = extraction.target else {
            self.throttle.pace().await;
            self.marketplace
                .send_message(
                    details.chat_id,
                    "❌ Не удалось определить Telegram username. Пожалуйста, отправьте ваш @username в чат.",
                )
                .await?;
            self.tracker
                .begin(
                    details.buyer_id,
                    PendingClarification {
                        chat_id: details.chat_id,
                        quantity,
                        order_id: details.order_id.clone(),
                        state: ClarificationState::AwaitingTarget,
                    },
                )
                .await;
            return Ok(());
        };

        info!(
            target = "stardrop.events",
            order_id = %order_id,
            delivery_target = %target,
            quantity = quantity,
            "order resolved from metadata",
        );
        self.throttle.pace().await;
        self.marketplace
            .send_message(
                details.chat_id,
                &format!(
                    "Спасибо за покупку!\nМы отправим {quantity} ⭐ на аккаунт @{target} в течение 1-2 минут"
                ),
            )
            .await?;
        self.enqueue(QueueItem {
            chat_id: details.chat_id,
            target,
            quantity,
            order_id: details.order_id,
        })
        .await
    }

    async fn handle_new_message(
        &self,
        chat_id: u64,
        author_id: u64,
        text: &str,
    ) -> Result<(), EventError> {
        if self.self_id == Some(author_id) {
            return Ok(());
        }
        let Some(pending) = self.tracker.take(author_id).await else {
            // Not a clarification reply; someone else's chatter.
            return Ok(());
        };
        // Single-state machine today; the match keeps additions honest.
        let ClarificationState::AwaitingTarget = pending.state;

        let target = extract::normalize_target(text);
        let handle = format!("@{target}");

        if target.is_empty() || !self.provider.username_exists(&handle).await {
            self.throttle.pace().await;
            let sent = self
                .marketplace
                .send_message(
                    chat_id,
                    &format!(
                        "❌ Ник \"{handle}\" не найден. Пожалуйста, введите правильный Telegram-тег (пример: @username)."
                    ),
                )
                .await;
            // The buyer stays in the dialog whether or not the re-prompt
            // reached them; a dropped entry would orphan a paid order.
            self.tracker.restore(author_id, pending).await;
            sent?;
            return Ok(());
        }

        self.throttle.pace().await;
        if let Err(err) = self
            .marketplace
            .send_message(
                chat_id,
                &format!(
                    "Спасибо!\nМы отправим {} ⭐ на аккаунт {handle} в течение 1-2 минут",
                    pending.quantity
                ),
            )
            .await
        {
            // Keep the entry so the buyer's next reply picks the order up
            // again instead of losing it to a transient send failure.
            self.tracker.restore(author_id, pending).await;
            return Err(err.into());
        }
        self.enqueue(QueueItem {
            chat_id: pending.chat_id,
            target,
            quantity: pending.quantity,
            order_id: pending.order_id,
        })
        .await
    }

    async fn enqueue(&self, item: QueueItem) -> Result<(), EventError> {
        self.queue
            .enqueue(item)
            .await
            .map_err(|_| EventError::QueueClosed)
    }

    #[cfg(test)]
    pub async fn awaiting_target(&self, buyer_id: u64) -> bool {
        self.tracker.is_pending(buyer_id).await
    }
}

/// Structured parameters win over the free-text title when both exist.
fn extract_details(details: &OrderDetails) -> Extraction {
    if !details.params.is_empty() {
        let extraction = extract::extract_from_params(&details.params);
        if extraction.target.is_some() || extraction.quantity.is_some() {
            return extraction;
        }
    }
    details
        .title
        .as_deref()
        .map(extract::extract_from_text)
        .unwrap_or_default()
}
