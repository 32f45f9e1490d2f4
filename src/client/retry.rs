//! Exponential-backoff retry engine
//!
//! Three named profiles cover the backend's call sites: `critical` for
//! state-changing requests, `fetch` for reads, and `auth` for session
//! checks. Retryability is decided by a classifier over structured
//! `ApiError` variants, never by matching on error messages.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use super::ApiResult;
use crate::config::RetrySettings;
use crate::error::ApiError;

/// Decides whether an error is worth another attempt.
pub type RetryClassifier = fn(&ApiError) -> bool;

/// Network failures and 5xx responses.
pub fn is_transient(err: &ApiError) -> bool {
    err.is_network() || err.is_server_error()
}

/// Network failures only.
pub fn is_network(err: &ApiError) -> bool {
    err.is_network()
}

/// Retry policy for one class of operation.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first (0 behaves as 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,
    pub classifier: RetryClassifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// State-changing requests: 5 attempts, 1s doubling up to 30s.
    pub fn critical() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            classifier: is_transient,
        }
    }

    /// Reads: 3 attempts, 1s doubling up to 10s.
    pub fn fetch() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            classifier: is_transient,
        }
    }

    /// Auth flows: 2 attempts, network errors only.
    pub fn auth() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            classifier: is_network,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[cfg(test)]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[cfg(test)]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[cfg(test)]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Delay before the `retry`-th retry (1-based):
    /// `min(initial_delay * backoff_factor^(retry-1), max_delay)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_factor.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// The three retry profiles used by the runtime.
#[derive(Debug, Clone, Copy)]
pub struct RetryProfiles {
    pub critical: RetryPolicy,
    pub fetch: RetryPolicy,
    pub auth: RetryPolicy,
}

impl Default for RetryProfiles {
    fn default() -> Self {
        Self {
            critical: RetryPolicy::critical(),
            fetch: RetryPolicy::fetch(),
            auth: RetryPolicy::auth(),
        }
    }
}

impl From<&RetrySettings> for RetryProfiles {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            critical: RetryPolicy::critical().with_max_attempts(settings.critical_attempts),
            fetch: RetryPolicy::fetch().with_max_attempts(settings.fetch_attempts),
            auth: RetryPolicy::auth().with_max_attempts(settings.auth_attempts),
        }
    }
}

/// Run `operation` until it succeeds, the classifier rejects the error, or
/// the attempt budget is spent. Returns the last error on failure.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    debug!("Giving up after {} attempts: {}", attempt, err);
                    return Err(err);
                }
                if !(policy.classifier)(&err) {
                    return Err(err);
                }

                let delay = policy.delay_for_retry(attempt);
                warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt, max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
