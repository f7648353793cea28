use once_cell::sync::Lazy;
use std::env;

pub static FRAGMENT_API_URL: Lazy<String> = Lazy::new(|| {
    env::var("FRAGMENT_API_URL").unwrap_or_else(|_| "https://api.fragment-api.com/v1".to_string())
});

pub static FRAGMENT_API_KEY: Lazy<String> =
    Lazy::new(|| env::var("FRAGMENT_API_KEY").unwrap_or_default());

pub static FRAGMENT_PHONE: Lazy<String> =
    Lazy::new(|| env::var("FRAGMENT_PHONE").unwrap_or_default());

/// Whitespace-separated recovery phrase words.
pub static FRAGMENT_MNEMONICS: Lazy<String> =
    Lazy::new(|| env::var("FRAGMENT_MNEMONICS").unwrap_or_default());

pub static TOKEN_FILE: Lazy<String> =
    Lazy::new(|| env::var("FRAGMENT_TOKEN_FILE").unwrap_or_else(|_| "auth_token.json".to_string()));

/// Smallest star order the provider accepts.
pub const MIN_STARS_PER_ORDER: u32 = 50;
