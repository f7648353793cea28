pub mod auth;
pub mod client;
pub mod config;
pub mod error;

pub use auth::{FragmentError, SessionStore};
pub use client::{DeliveryOutcome, FragmentClient, StarsProvider};
pub use error::{DeliveryErrorKind, classify_response};
