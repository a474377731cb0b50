//! Bounded retry around a single oracle call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Oracle, OracleError, OracleResult};

/// How hard to try before giving up on one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed wait after a rate-limit signal, in seconds.
    pub backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_secs: 0,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Call `oracle` with `prompt`, retrying transient failures.
///
/// - `RateLimited`: sleep for the fixed backoff, then retry.
/// - `Unavailable`: retry immediately.
/// - `MalformedResponse` / `NotConfigured`: returned at once.
///
/// When attempts run out the last failure is returned; callers turn it
/// into data rather than propagating it further.
pub async fn complete_with_retry<O>(
    oracle: &O,
    prompt: &str,
    policy: &RetryPolicy,
) -> OracleResult<String>
where
    O: Oracle + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let err = match oracle.complete(prompt).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            warn!(attempt, error = %err, "oracle retries exhausted");
            return Err(err);
        }

        match &err {
            OracleError::RateLimited(_) => {
                warn!(
                    attempt,
                    backoff_secs = policy.backoff_secs,
                    "oracle rate limited, backing off"
                );
                tokio::time::sleep(policy.backoff()).await;
            }
            OracleError::Unavailable(reason) => {
                warn!(attempt, reason = %reason, "oracle unavailable, retrying");
            }
            OracleError::MalformedResponse { .. } | OracleError::NotConfigured(_) => {
                return Err(err);
            }
        }

        attempt += 1;
    }
}
