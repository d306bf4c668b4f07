// src/utils/retry.rs

//! Bounded fixed-cooldown retry shared by listing fetches.
//!
//! The catalog site's outages are usually short, so a failed fetch waits a
//! full cooldown before the same URL is tried again. The number of retries
//! is bounded and the cooldown ends early when shutdown is requested.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

/// Retry behavior for a transient failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed wait between attempts.
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, cooldown: Duration) -> Self {
        Self {
            max_retries,
            cooldown,
        }
    }
}

/// Whether an error is worth another attempt.
///
/// Network failures and non-200 responses are transient; parse and
/// configuration problems will not fix themselves within a cooldown.
pub fn is_transient(error: &AppError) -> bool {
    matches!(error, AppError::Http(_) | AppError::Fetch { .. })
}

/// Run `operation` until it succeeds, fails permanently, exhausts the
/// retry budget, or `shutdown` is cancelled.
///
/// The closure receives the 0-indexed attempt number.
pub async fn retry_with_cooldown<F, Fut, T>(
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    context: &str,
    operation: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if shutdown.is_cancelled() {
            return Err(AppError::Shutdown);
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) => e,
        };

        if attempt >= policy.max_retries {
            return Err(AppError::fetch(
                context,
                format!("giving up after {} attempts: {}", attempt + 1, error),
            ));
        }

        log::warn!(
            "{} failed ({}). Retrying in {}s [{}/{}]",
            context,
            error,
            policy.cooldown.as_secs(),
            attempt + 1,
            policy.max_retries
        );

        tokio::select! {
            _ = shutdown.cancelled() => return Err(AppError::Shutdown),
            _ = tokio::time::sleep(policy.cooldown) => {}
        }
        attempt += 1;
    }
}
