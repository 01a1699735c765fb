//! Exponential backoff retry for exchange calls.
//!
//! Grounded in the retry loop shared by every signed REST call in the
//! original venue client (`place_order`, `cancel_order`, `get_order_detail`,
//! `get_current_price`): try up to `max_attempts`, sleeping `base_delay *
//! factor^attempt` between tries, surfacing the last error once attempts are
//! exhausted.

use std::future::Future;
use std::time::Duration;

use log::warn;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: u32 = 2;

/// Retry `op` up to three times with exponential backoff (base 1s, factor 2)
/// on transient errors. `op` is re-invoked from scratch on each attempt; it
/// must be idempotent to retry safely — true for the read/place/cancel calls
/// this wraps.
pub async fn with_backoff<T, E, F, Fut>(label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = BASE_DELAY;
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt == MAX_ATTEMPTS {
                    last_err = Some(e);
                    break;
                }
                warn!(
                    "{label} attempt {attempt}/{MAX_ATTEMPTS} failed: {e}; retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                delay *= BACKOFF_FACTOR;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let calls = RefCell::new(0);
        let result: Result<i32, &str> = with_backoff("test", || {
            *calls.borrow_mut() += 1;
            async { Ok(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = RefCell::new(0);
        let result: Result<i32, &str> = with_backoff("test", || {
            let mut c = calls.borrow_mut();
            *c += 1;
            let attempt = *c;
            async move {
                if attempt < 3 {
                    Err("transient")
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = RefCell::new(0);
        let result: Result<i32, &str> = with_backoff("test", || {
            *calls.borrow_mut() += 1;
            async { Err("down") }
        })
        .await;
        assert_eq!(result, Err("down"));
        assert_eq!(*calls.borrow(), MAX_ATTEMPTS);
    }
}
