//! Backoff policy: which upstream failures are worth retrying, and how long to wait

use std::time::Duration;

use crate::error::UpstreamError;

/// Decides retryability and delay for a classified upstream failure
///
/// Transient failures back off exponentially from `base`. Rate limits back off
/// linearly in multiples of `rate_limit_unit`, which is deliberately large so
/// a provider with a strict per-minute quota has time to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub rate_limit_unit: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            rate_limit_unit: Duration::from_secs(15),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, rate_limit_unit: Duration) -> Self {
        Self {
            base,
            rate_limit_unit,
        }
    }

    /// Whether another attempt may succeed
    pub fn should_retry(&self, error: &UpstreamError) -> bool {
        match error {
            UpstreamError::Transient(_) | UpstreamError::RateLimited(_) => true,
            UpstreamError::Client { .. } | UpstreamError::NoData(_) => false,
            // Unknown failures are retried
            UpstreamError::Unclassified(_) => true,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (0-based)
    pub fn delay_for(&self, error: &UpstreamError, attempt: u32) -> Duration {
        if error.is_rate_limited() {
            self.rate_limit_unit.saturating_mul(attempt.saturating_add(1))
        } else {
            let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
            self.base.saturating_mul(factor)
        }
    }
}
