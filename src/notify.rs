use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

/// Operator-facing notification channel. Fire-and-forget: failures are
/// logged, never propagated into order processing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str, rich: bool);
}

/// Telegram Bot API sink for the operator channel.
pub struct TelegramNotifier {
    http: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn from_env(http: Client) -> Option<Self> {
        let bot_token = std::env::var("NOTIFY_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("NOTIFY_CHAT_ID").ok()?;
        Some(Self {
            http,
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str, rich: bool) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let mut payload = json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if rich {
            payload["parse_mode"] = json!("HTML");
        }
        match self.http.post(url).json(&payload).send().await {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => {
                warn!(target = "stardrop.notify", status = %res.status(), "notification rejected");
            }
            Err(err) => {
                warn!(target = "stardrop.notify", error = %err, "notification failed");
            }
        }
    }
}

/// Fallback sink when no operator channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str, _rich: bool) {
        info!(target = "stardrop.notify", "{text}");
    }
}

/// In-memory sink for tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("notifier lock").clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str, _rich: bool) {
        self.messages
            .lock()
            .expect("notifier lock")
            .push(text.to_string());
    }
}
