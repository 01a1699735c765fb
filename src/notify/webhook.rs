//! Generic webhook notification channel.
//!
//! Grounded in the teacher's `utils::alerts::AlertManager`: a plain JSON POST
//! to a configured URL, disabled when no URL is configured, errors swallowed.

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde_json::json;

use super::Notifier;

pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
        }
    }

    async fn send_inner(&self, url: &str, text: &str) -> anyhow::Result<()> {
        self.client
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> bool {
        let Some(url) = &self.webhook_url else {
            return true;
        };
        match self.send_inner(url, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("webhook notification failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_without_url_is_a_noop() {
        let notifier = WebhookNotifier::new(None);
        assert!(notifier.send("hello").await);
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let notifier = WebhookNotifier::new(Some("http://127.0.0.1:1".into()));
        // Nothing listens on port 1; the connection attempt fails and must
        // be swallowed as `false`, never a panic or propagated error.
        assert!(!notifier.send("hello").await);
    }

    #[tokio::test]
    async fn non_200_response_is_swallowed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/hook").with_status(500).create_async().await;

        let notifier = WebhookNotifier::new(Some(format!("{}/hook", server.url())));
        assert!(!notifier.send("hello").await);
        mock.assert_async().await;
    }
}
