use serde::Deserialize;
use std::collections::BTreeMap;

/// Events emitted by the marketplace collaborator's polling loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketplaceEvent {
    NewOrder {
        order_id: String,
    },
    NewMessage {
        chat_id: u64,
        author_id: u64,
        text: String,
    },
}

/// Full order record fetched from the marketplace once a new-order event
/// arrives. Populated in one place at the collaborator boundary; optional
/// fields are explicit rather than probed for.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetails {
    pub order_id: String,
    pub chat_id: u64,
    pub buyer_id: u64,
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Free-text title/description of the purchased lot.
    #[serde(default)]
    pub title: Option<String>,
    /// Structured `(label, value)` parameters, when the listing defines them.
    #[serde(default)]
    pub params: Vec<(String, String)>,
    /// Number of lot units bought in this order. The extracted star quantity
    /// is per unit, so the delivered amount is `quantity * lot_quantity`.
    #[serde(default = "default_lot_quantity")]
    pub lot_quantity: u32,
}

fn default_lot_quantity() -> u32 {
    1
}

/// A fully resolved delivery, ready for the worker. The target is non-empty
/// and has its leading `@` stripped by the time it gets here.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub chat_id: u64,
    pub target: String,
    pub quantity: u32,
    pub order_id: String,
}

/// Editable listing form as the marketplace hands it back. `fields` is the
/// raw form payload, round-tripped untouched on save.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingFields {
    pub listing_id: String,
    pub active: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}
