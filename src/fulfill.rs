use crate::fragment::{StarsProvider, classify_response};
use crate::marketplace::{Marketplace, MarketplaceError};
use crate::models::QueueItem;
use crate::notify::Notifier;
use crate::remediation::{Remedy, buyer_apology, decide};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Processes one resolved order end to end: provider delivery, then the
/// remediation policy on failure. Owned by the queue worker; every terminal
/// outcome messages the buyer and notifies the operator.
#[derive(Clone)]
pub struct Fulfiller {
    provider: Arc<dyn StarsProvider>,
    marketplace: Arc<dyn Marketplace>,
    notifier: Arc<dyn Notifier>,
}

impl Fulfiller {
    pub fn new(
        provider: Arc<dyn StarsProvider>,
        marketplace: Arc<dyn Marketplace>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            provider,
            marketplace,
            notifier,
        }
    }

    pub async fn process(&self, item: &QueueItem) -> Result<(), MarketplaceError> {
        info!(
            target = "stardrop.fulfill",
            order_id = %item.order_id,
            delivery_target = %item.target,
            quantity = item.quantity,
            "delivering",
        );
        let started = Instant::now();
        let outcome = self.provider.deliver(&item.target, item.quantity).await;
        crate::metrics::delivery_elapsed(started.elapsed().as_millis());

        if outcome.delivered {
            // Operator first: the lifecycle notification must land even if
            // the buyer message bounces.
            self.notifier
                .notify(
                    &format!(
                        "✅ Заказ {}: {} ⭐ доставлены @{}",
                        item.order_id, item.quantity, item.target
                    ),
                    false,
                )
                .await;
            self.marketplace
                .send_message(
                    item.chat_id,
                    &format!(
                        "✅ Успешно отправлено {} ⭐ пользователю @{}!",
                        item.quantity, item.target
                    ),
                )
                .await?;
            return Ok(());
        }

        let kind = classify_response(&outcome.raw_response);
        warn!(
            target = "stardrop.fulfill",
            order_id = %item.order_id,
            error_kind = ?kind,
            raw = %outcome.raw_response,
            "delivery failed",
        );
        self.marketplace
            .send_message(item.chat_id, buyer_apology(kind))
            .await?;

        match decide(kind) {
            Remedy::Refund => {
                self.notifier
                    .notify(
                        &format!("❌ Заказ {}: доставка отклонена ({kind:?})", item.order_id),
                        false,
                    )
                    .await;
                self.refund(item).await?;
            }
            Remedy::DeactivateAndRefund => {
                self.deactivate_listing_for(item).await;
                self.refund(item).await?;
            }
            Remedy::NotifyOnly => {
                self.notifier
                    .notify(
                        &format!(
                            "⚠️ Заказ {}: нераспознанная ошибка провайдера, нужен ручной разбор.\n{}",
                            item.order_id, outcome.raw_response
                        ),
                        false,
                    )
                    .await;
            }
        }
        Ok(())
    }

    /// Refund the buyer. A failing refund call is terminal: the operator is
    /// told why and the buyer is pointed at the admin, with no retry.
    async fn refund(&self, item: &QueueItem) -> Result<(), MarketplaceError> {
        match self.marketplace.refund(&item.order_id).await {
            Ok(()) => {
                info!(target = "stardrop.fulfill", order_id = %item.order_id, "refund issued");
                // Operator hears about the refund regardless of whether the
                // buyer message goes through.
                self.notifier
                    .notify(
                        &format!("↩️ Заказ {}: средства возвращены покупателю", item.order_id),
                        false,
                    )
                    .await;
                self.marketplace
                    .send_message(item.chat_id, "✅ Средства успешно возвращены.")
                    .await?;
            }
            Err(err) => {
                warn!(target = "stardrop.fulfill", order_id = %item.order_id, error = %err, "refund failed");
                self.notifier
                    .notify(
                        &format!("‼️ Заказ {}: возврат не прошёл: {err}", item.order_id),
                        false,
                    )
                    .await;
                self.marketplace
                    .send_message(item.chat_id, "❌ Ошибка возврата. Свяжитесь с админом.")
                    .await?;
            }
        }
        Ok(())
    }

    /// Disable the listing behind the order so no further orders arrive until
    /// the operator restocks. Idempotent: re-checks the active flag before
    /// mutating. The operator hears about every outcome, including failures
    /// of the deactivation call itself.
    async fn deactivate_listing_for(&self, item: &QueueItem) {
        let listing_id = match self.marketplace.get_order(&item.order_id).await {
            Ok(details) => details.listing_id,
            Err(err) => {
                self.notifier
                    .notify(
                        &format!(
                            "‼️ Заказ {}: не удалось загрузить заказ для деактивации лота: {err}",
                            item.order_id
                        ),
                        false,
                    )
                    .await;
                return;
            }
        };
        let Some(listing_id) = listing_id else {
            self.notifier
                .notify(
                    &format!(
                        "‼️ Заказ {}: у заказа нет лота, деактивация невозможна",
                        item.order_id
                    ),
                    false,
                )
                .await;
            return;
        };
        self.deactivate_listing(&listing_id).await;
    }

    pub async fn deactivate_listing(&self, listing_id: &str) {
        let mut listing = match self.marketplace.get_listing(listing_id).await {
            Ok(listing) => listing,
            Err(err) => {
                self.notifier
                    .notify(
                        &format!("‼️ Лот {listing_id}: не удалось загрузить для деактивации: {err}"),
                        false,
                    )
                    .await;
                return;
            }
        };
        if !listing.active {
            self.notifier
                .notify(&format!("ℹ️ Лот {listing_id} уже деактивирован"), false)
                .await;
            return;
        }
        listing.active = false;
        match self.marketplace.save_listing(&listing).await {
            Ok(()) => {
                info!(target = "stardrop.fulfill", listing_id = %listing_id, "listing deactivated");
                self.notifier
                    .notify(
                        &format!("⛔ Лот {listing_id} деактивирован до пополнения баланса"),
                        false,
                    )
                    .await;
            }
            Err(err) => {
                self.notifier
                    .notify(
                        &format!("‼️ Лот {listing_id}: деактивация не прошла: {err}"),
                        false,
                    )
                    .await;
            }
        }
    }
}
