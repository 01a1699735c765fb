//! Telegram notification channel.
//!
//! Directly grounded in the teacher's `utils::telegram::TelegramBot`: same
//! disabled-when-missing-credentials behavior, same swallow-the-error send.

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde_json::json;

use super::Notifier;

pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    enabled: bool,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        let enabled = token.is_some() && chat_id.is_some();
        Self {
            token: token.unwrap_or_default(),
            chat_id: chat_id.unwrap_or_default(),
            enabled,
            client: Client::new(),
        }
    }

    async fn send_inner(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        self.client
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        if !self.enabled {
            return true;
        }
        match self.send_inner(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("telegram notification failed: {e}");
                false
            }
        }
    }
}
