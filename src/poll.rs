//! Fixed-interval polling until a condition holds or a deadline passes.
//!
//! Uses tokio's clock, so tests can drive it with a paused runtime.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// Poll until a condition is true, or the deadline passes.
///
/// The predicate runs immediately, then every `interval`. The final sleep is
/// clipped to the time left, so this returns within `deadline + interval`
/// even for a predicate that never succeeds.
pub async fn await_condition<F, Fut>(interval: Duration, deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    eventually("condition", interval, deadline, move || {
        let fut = check();
        async move { Ok::<_, Error>(fut.await) }
    })
    .await
    .is_ok()
}

/// Poll a fallible probe until it reports `true`.
///
/// Transient errors (see [`Error::is_transient`]) count as "not yet" and are
/// remembered as the last observed state. Any other error is a confirmed
/// negative and ends polling at once. On deadline expiry the returned
/// [`Error::Timeout`] names `what`, the elapsed time and the last state.
pub async fn eventually<F, Fut>(
    what: &str,
    interval: Duration,
    deadline: Duration,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let mut last = String::from("not yet polled");
    loop {
        match probe().await {
            Ok(true) => {
                debug!(%what, elapsed = ?start.elapsed(), "condition met");
                return Ok(());
            }
            Ok(false) => last = "condition false".to_string(),
            Err(e) if e.is_transient() => {
                debug!(%what, error = %e, "transient error while polling");
                last = format!("error: {e}");
            }
            Err(e) => return Err(e),
        }
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return Err(Error::Timeout {
                what: what.to_string(),
                elapsed,
                last,
            });
        }
        sleep(interval.min(deadline - elapsed)).await;
    }
}
