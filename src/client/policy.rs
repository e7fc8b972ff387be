use crate::config::RetryOptions;
use crate::resilience::headers::Throttle;
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;

/// What the scheduler does after an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Decision {
    /// Terminal response: hand it to the caller (success or classified error).
    Complete,
    /// Wait out a 429, then dispatch again. Never counts as an attempt.
    Throttle(Throttle),
    /// Transient failure: sleep, then dispatch again.
    Retry { delay: Duration },
    /// Transient failure with the attempt cap exhausted.
    Fail,
}

/// Outcome of one attempt as seen by the policy.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome<'a> {
    Response {
        status: StatusCode,
        throttle: Option<&'a Throttle>,
    },
    TransportFailure,
}

/// Retry policy shared across network failures and 5xx.
///
/// Keep this deterministic apart from jitter: the same outcome and attempt
/// number always yield the same decision.
pub(crate) struct PolicyEngine {
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl PolicyEngine {
    pub fn new(options: &RetryOptions) -> Self {
        Self {
            max_attempts: options.max_attempts.max(1),
            min_delay_ms: options.min_delay_ms,
            max_delay_ms: options.max_delay_ms.max(options.min_delay_ms),
            jitter: options.jitter,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        // exponential backoff: min_delay * 2^attempt
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let base = self.min_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        let chosen = if self.jitter && base > 0 {
            // Up to +25%, still capped.
            let extra = rand::rng().random_range(0..=base / 4);
            (base + extra).min(self.max_delay_ms)
        } else {
            base
        };
        Duration::from_millis(chosen)
    }

    /// Decide what to do next. `attempts` is the number of transient retries already made.
    pub fn decide(&self, outcome: Outcome<'_>, attempts: u32) -> Decision {
        let transient = match outcome {
            Outcome::TransportFailure => true,
            Outcome::Response { status, throttle } => {
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let throttle = throttle.copied().unwrap_or(Throttle {
                        retry_after: Duration::from_secs(1),
                        global: false,
                    });
                    return Decision::Throttle(throttle);
                }
                if !status.is_server_error() {
                    return Decision::Complete;
                }
                true
            }
        };

        if transient && attempts + 1 < self.max_attempts {
            Decision::Retry {
                delay: self.backoff_delay(attempts),
            }
        } else {
            Decision::Fail
        }
    }
}
