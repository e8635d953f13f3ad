//! Generic retry adapter.
//!
//! Every external operation in the pipeline (directory reads, notifier
//! round trips) goes through [`retry_with`], parameterized by a backoff
//! policy and the error classifier. The classifier decides per attempt
//! whether the failure is worth another round trip or must surface
//! immediately.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::warn;

use crate::config::BackoffPolicy;
use crate::ErrorClass;
use crate::Result;

/// Boxed future borrowing the retried state.
pub type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Delay before the `attempt`-th retry (first retry is attempt 1).
pub fn backoff_delay(
    policy: &BackoffPolicy,
    attempt: u32,
) -> Duration {
    let exp = attempt.min(16);
    let delay_ms = policy
        .base_delay_ms
        .saturating_mul(1u64 << exp)
        .min(policy.max_delay_ms);
    Duration::from_millis(delay_ms)
}

/// Drives `op` against `state` until it succeeds, fails fatally, or the
/// policy's attempt budget is exhausted. `max_retries == 0` retries without
/// bound.
///
/// `recover` runs before each re-attempt and is where callers re-establish
/// connections; its transient failures are logged and the loop continues
/// (the next `op` attempt will fail transiently again if the recovery did
/// not take), anything else surfaces immediately.
pub async fn retry_with<S, T, F, R>(
    what: &'static str,
    policy: &BackoffPolicy,
    state: &mut S,
    mut op: F,
    mut recover: R,
) -> Result<T>
where
    F: for<'a> FnMut(&'a mut S) -> OpFuture<'a, T>,
    R: for<'a> FnMut(&'a mut S) -> OpFuture<'a, ()>,
{
    let mut attempt: u32 = 0;

    loop {
        match op(state).await {
            Ok(v) => return Ok(v),
            Err(e) if e.classify() != ErrorClass::Transient => return Err(e),
            Err(e) => {
                attempt += 1;
                if policy.max_retries != 0 && attempt as usize > policy.max_retries {
                    warn!(%e, what, attempt, "retry budget exhausted");
                    return Err(e);
                }

                let delay = backoff_delay(policy, attempt);
                warn!(%e, what, attempt, ?delay, "transient failure, backing off");
                tokio::time::sleep(delay).await;

                if let Err(e) = recover(state).await {
                    if e.classify() != ErrorClass::Transient {
                        return Err(e);
                    }
                    warn!(%e, what, attempt, "recovery step failed, continuing");
                }
            }
        }
    }
}
