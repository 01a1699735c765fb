//! grid-trader: a crash-recoverable grid trading engine.
//!
//! One worker process owns exactly one market's ladder: it places a buy,
//! waits for the fill, flips to a sell at the next rung up plus a fresh buy
//! at the rung below, and repeats. A watchdog process monitors workers via
//! heartbeat files and restarts any that stop responding.
//!
//! See [`engine::GridEngine`] for the per-tick state machine,
//! [`engine::reconciler`] for startup reconciliation against the exchange,
//! and [`supervisor::Supervisor`] for the watchdog.

#![warn(rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod ladder;
pub mod notify;
pub mod state;
pub mod supervisor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use engine::GridEngine;
pub use error::EngineError;
pub use exchange::{ExchangeGateway, HttpGateway};
pub use ladder::{GapMode, GridLevel};
pub use notify::{CompositeNotifier, Notifier};
pub use state::{LadderSnapshot, StateStore};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

pub fn version_string() -> String {
    format!("{NAME} v{VERSION}")
}

/// Shared prelude for the two binaries and integration tests.
pub mod prelude {
    pub use crate::config::{loader::ConfigLoader, MarketConfig, MarketsConfig};
    pub use crate::engine::GridEngine;
    pub use crate::error::EngineError;
    pub use crate::exchange::{ExchangeGateway, HttpGateway};
    pub use crate::notify::{CompositeNotifier, Notifier};
    pub use crate::state::StateStore;
    pub use anyhow::{Context, Result};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_is_not_empty() {
        assert!(!version_string().is_empty());
    }
}
