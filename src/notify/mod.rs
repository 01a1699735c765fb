//! Outbound notification channel.
//!
//! Exposed as a capability (a trait object) passed into components, not a
//! module-level side effect, per the spec's design notes. Every send is
//! best-effort: transport failures are logged and swallowed, never
//! propagated, so a flaky notification endpoint can never block the engine.

pub mod telegram;
pub mod webhook;

use async_trait::async_trait;

pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text`. Returns `false` on failure; never returns an `Err` —
    /// callers are not expected to handle notification failures specially.
    async fn send(&self, text: &str) -> bool;
}

/// Fan out a message to every configured channel, in order. A disabled
/// channel (no credentials) is a true no-op, not logged as a failure.
pub struct CompositeNotifier {
    channels: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn send(&self, text: &str) -> bool {
        let mut all_ok = true;
        for channel in &self.channels {
            if !channel.send(text).await {
                all_ok = false;
            }
        }
        all_ok
    }
}

/// Prefix a message with a severity emoji, matching the teacher's notifier
/// formatting convention and the spec's "severity emoji prefix" requirement.
pub fn format_alert(market: &str, level: Option<u64>, body: &str) -> String {
    match level {
        Some(l) => format!("🚨 [{market} L{l}] {body}"),
        None => format!("🚨 [{market}] {body}"),
    }
}
