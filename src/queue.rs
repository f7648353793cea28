use crate::fulfill::Fulfiller;
use crate::models::QueueItem;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

#[derive(Debug, Error)]
#[error("fulfillment worker is not available")]
pub struct QueueClosed;

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub capacity: usize,
    pub cooldown: Duration,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let capacity = std::env::var("QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(64);
        let cooldown = std::env::var("COOLDOWN_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        Self {
            capacity,
            cooldown: Duration::from_secs(cooldown),
        }
    }
}

/// Single-consumer FIFO of resolved deliveries. The producer side is cheap
/// and cloneable; the worker serializes provider calls and spaces them by
/// the cooldown. Dropping every handle ends the worker; queued items are
/// dropped with it (no durability across restarts).
#[derive(Clone)]
pub struct FulfillmentQueue {
    tx: mpsc::Sender<QueueItem>,
}

impl FulfillmentQueue {
    pub fn spawn(fulfiller: Fulfiller) -> (Self, JoinHandle<()>) {
        Self::spawn_with(fulfiller, QueueConfig::from_env())
    }

    pub fn spawn_with(fulfiller: Fulfiller, config: QueueConfig) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<QueueItem>(config.capacity);
        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                // One bad item must not take the worker down.
                if let Err(err) = fulfiller.process(&item).await {
                    error!(
                        target = "stardrop.queue",
                        order_id = %item.order_id,
                        error = %err,
                        "order processing failed",
                    );
                }
                sleep(config.cooldown).await;
            }
            info!(target = "stardrop.queue", "fulfillment worker stopped");
        });
        (Self { tx }, handle)
    }

    pub async fn enqueue(&self, item: QueueItem) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::client::InMemoryStarsProvider;
    use crate::marketplace::InMemoryMarketplace;
    use crate::notify::RecordingNotifier;
    use std::sync::Arc;

    fn item(order_id: &str, target: &str) -> QueueItem {
        QueueItem {
            chat_id: 1,
            target: target.to_string(),
            quantity: 50,
            order_id: order_id.to_string(),
        }
    }

    fn test_config() -> QueueConfig {
        QueueConfig {
            capacity: 8,
            cooldown: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn items_are_processed_in_fifo_order_with_cooldown() {
        let provider = Arc::new(InMemoryStarsProvider::succeeding());
        let fulfiller = Fulfiller::new(
            provider.clone(),
            Arc::new(InMemoryMarketplace::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let (queue, worker) = FulfillmentQueue::spawn_with(fulfiller, test_config());

        queue.enqueue(item("A", "alpha")).await.expect("enqueue");
        queue.enqueue(item("B", "bravo")).await.expect("enqueue");
        queue.enqueue(item("C", "charlie")).await.expect("enqueue");
        drop(queue);
        worker.await.expect("worker");

        let deliveries = provider.deliveries();
        let targets: Vec<&str> = deliveries.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(targets, vec!["alpha", "bravo", "charlie"]);
        for pair in deliveries.windows(2) {
            assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn a_failing_item_does_not_stop_the_worker() {
        let provider = Arc::new(InMemoryStarsProvider::failing_with("<html>502</html>"));
        let marketplace = Arc::new(InMemoryMarketplace::new());
        let fulfiller = Fulfiller::new(
            provider.clone(),
            marketplace.clone(),
            Arc::new(RecordingNotifier::new()),
        );
        let (queue, worker) = FulfillmentQueue::spawn_with(fulfiller, test_config());

        queue.enqueue(item("A", "alpha")).await.expect("enqueue");
        queue.enqueue(item("B", "bravo")).await.expect("enqueue");
        drop(queue);
        worker.await.expect("worker");

        assert_eq!(provider.deliveries().len(), 2);
    }

    #[tokio::test]
    async fn worker_exits_when_all_producers_are_gone() {
        let fulfiller = Fulfiller::new(
            Arc::new(InMemoryStarsProvider::succeeding()),
            Arc::new(InMemoryMarketplace::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let (queue, worker) = FulfillmentQueue::spawn_with(fulfiller, test_config());
        drop(queue);
        worker.await.expect("worker");
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_reports_closed() {
        let fulfiller = Fulfiller::new(
            Arc::new(InMemoryStarsProvider::succeeding()),
            Arc::new(InMemoryMarketplace::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let (queue, worker) = FulfillmentQueue::spawn_with(fulfiller, test_config());
        worker.abort();
        let _ = worker.await;
        // Receiver is gone; enqueue must fail rather than hang.
        assert!(queue.enqueue(item("X", "x")).await.is_err());
    }
}
