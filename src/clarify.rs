use std::collections::HashMap;
use tokio::sync::Mutex;

/// States a buyer's clarification dialog can be in. Single-variant today;
/// the enum keeps room for richer dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationState {
    AwaitingTarget,
}

/// What we remember about an order whose delivery target is still unknown.
#[derive(Debug, Clone)]
pub struct PendingClarification {
    pub chat_id: u64,
    pub quantity: u32,
    pub order_id: String,
    pub state: ClarificationState,
}

/// Per-buyer clarification bookkeeping, shared between the order-event path
/// and the message path. At most one entry per buyer: a second unresolved
/// order overwrites the first (accepted limitation).
#[derive(Default)]
pub struct ClarificationTracker {
    pending: Mutex<HashMap<u64, PendingClarification>>,
}

impl ClarificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, buyer_id: u64, pending: PendingClarification) {
        self.pending.lock().await.insert(buyer_id, pending);
    }

    /// Claims the buyer's pending entry, removing it. The caller puts it back
    /// with [`restore`](Self::restore) when the reply turns out invalid.
    pub async fn take(&self, buyer_id: u64) -> Option<PendingClarification> {
        self.pending.lock().await.remove(&buyer_id)
    }

    pub async fn restore(&self, buyer_id: u64, pending: PendingClarification) {
        self.pending.lock().await.insert(buyer_id, pending);
    }

    pub async fn is_pending(&self, buyer_id: u64) -> bool {
        self.pending.lock().await.contains_key(&buyer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(order_id: &str, quantity: u32) -> PendingClarification {
        PendingClarification {
            chat_id: 10,
            quantity,
            order_id: order_id.to_string(),
            state: ClarificationState::AwaitingTarget,
        }
    }

    #[tokio::test]
    async fn take_removes_the_entry() {
        let tracker = ClarificationTracker::new();
        tracker.begin(1, pending("A", 50)).await;
        assert!(tracker.is_pending(1).await);
        let claimed = tracker.take(1).await.expect("entry");
        assert_eq!(claimed.order_id, "A");
        assert!(!tracker.is_pending(1).await);
        assert!(tracker.take(1).await.is_none());
    }

    #[tokio::test]
    async fn second_order_overwrites_rather_than_stacks() {
        let tracker = ClarificationTracker::new();
        tracker.begin(1, pending("A", 50)).await;
        tracker.begin(1, pending("B", 100)).await;
        let claimed = tracker.take(1).await.expect("entry");
        assert_eq!(claimed.order_id, "B");
        assert_eq!(claimed.quantity, 100);
        assert!(tracker.take(1).await.is_none());
    }

    #[tokio::test]
    async fn restore_keeps_the_buyer_pending() {
        let tracker = ClarificationTracker::new();
        tracker.begin(1, pending("A", 50)).await;
        let claimed = tracker.take(1).await.expect("entry");
        tracker.restore(1, claimed).await;
        assert!(tracker.is_pending(1).await);
    }

    #[tokio::test]
    async fn unknown_buyer_has_nothing_pending() {
        let tracker = ClarificationTracker::new();
        assert!(!tracker.is_pending(42).await);
        assert!(tracker.take(42).await.is_none());
    }
}
