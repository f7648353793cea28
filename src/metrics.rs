use tracing::trace;

// Lightweight metrics helpers that are safe without a recorder installed.
// These intentionally avoid pulling in metrics macros to keep deps stable.

pub fn inc_events(kind: &'static str) {
    trace!(target = "stardrop.metrics", kind = kind, "events_total_inc");
}

pub fn delivery_elapsed(elapsed_ms: u128) {
    trace!(
        target = "stardrop.metrics",
        elapsed_ms = elapsed_ms as u64,
        "delivery_elapsed"
    );
}
