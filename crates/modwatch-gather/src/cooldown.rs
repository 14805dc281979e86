//! Retry-once policy for quota errors.
//!
//! [`retry_once`] runs an operation; on a rate-limit error it sleeps a fixed
//! cooldown and tries exactly once more. A second rate-limit error also costs
//! one cooldown, after which the unit of work is skipped. Other errors are
//! returned unchanged for the caller to classify.
//!
//! | Attempt | Outcome      | Next step                          |
//! |---------|--------------|------------------------------------|
//! | 1       | rate limited | notify `Retrying`, cooldown, retry |
//! | 2       | rate limited | notify `GivingUp`, cooldown, skip  |

use std::future::Future;
use std::time::Duration;

use crate::ShutdownSignal;

/// Result of a guarded operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// Rate limited twice, or shutdown arrived during a cooldown.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownEvent {
    Retrying,
    GivingUp,
}

/// Runs `operation` under the retry-once policy.
///
/// `on_rate_limit` is called with each rate-limit error, before the cooldown.
/// Cooldowns end early if `shutdown` is set, and the unit is then skipped.
///
/// # Errors
///
/// Returns any error for which `is_rate_limited` is `false`.
pub async fn retry_once<T, E, F, Fut>(
    cooldown: Duration,
    shutdown: &ShutdownSignal,
    is_rate_limited: impl Fn(&E) -> bool,
    mut on_rate_limit: impl FnMut(CooldownEvent, &E),
    mut operation: F,
) -> Result<Attempt<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match operation().await {
        Ok(value) => return Ok(Attempt::Done(value)),
        Err(err) if is_rate_limited(&err) => {
            on_rate_limit(CooldownEvent::Retrying, &err);
            if !shutdown.sleep(cooldown).await {
                return Ok(Attempt::Skipped);
            }
        }
        Err(err) => return Err(err),
    }

    match operation().await {
        Ok(value) => Ok(Attempt::Done(value)),
        Err(err) if is_rate_limited(&err) => {
            on_rate_limit(CooldownEvent::GivingUp, &err);
            shutdown.sleep(cooldown).await;
            Ok(Attempt::Skipped)
        }
        Err(err) => Err(err),
    }
}
