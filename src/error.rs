//! Error kinds for the grid engine.
//!
//! Everything above the exchange/state-store boundary uses `anyhow::Result`
//! with `.context(..)`; `EngineError` exists so callers that need to branch on
//! *kind* (the main loop's broad catch vs. the fatal-exit paths) can match on
//! it instead of string-sniffing an `anyhow::Error`.

use thiserror::Error;

/// Error classes from the fatal/non-fatal split.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Tick table has no entry for the requested symbol. Fatal: worker exits.
    #[error("unknown symbol: no tick registered for {market}")]
    UnknownSymbol { market: String },

    /// Persisted snapshot failed to parse. Fatal: worker exits rather than
    /// silently resetting accumulated profit.
    #[error("corrupt snapshot at {path}: {source}")]
    CorruptSnapshot {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Snapshot's ladder geometry doesn't match the current config. Not fatal
    /// on its own — the caller discards the snapshot and cold-starts.
    #[error("config mismatch with existing snapshot for {market}")]
    ConfigMismatch { market: String },

    /// Exchange rejected an order placement with a reason. Non-fatal: logged,
    /// notified, `PlacePair` returns `false`, the next health check repairs.
    #[error("order placement rejected for {market} level {level}: {reason}")]
    OrderRejected {
        market: String,
        level: u64,
        reason: String,
    },

    /// Transient network/auth error after retries exhausted.
    #[error("exchange call failed after retries: {0}")]
    ExchangeUnavailable(String),

    /// Config file failed validation before any engine work started.
    #[error("invalid market config for {market}: {reason}")]
    InvalidConfig { market: String, reason: String },
}

impl EngineError {
    /// Fatal kinds terminate the worker process; the supervisor restarts it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownSymbol { .. }
                | EngineError::CorruptSnapshot { .. }
                | EngineError::InvalidConfig { .. }
        )
    }
}
