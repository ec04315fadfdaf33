use std::time::Duration;

use charter_core::SyncOperation;
use chrono::{DateTime, Utc};
use config::RetryConfig;

/// Bounded exponential backoff for transient remote failures.
///
/// Delays are computed from the persisted attempt count rather than held in
/// a timer, so a schedule survives a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub fork_notify_max_attempts: u32
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(DateTime<Utc>),
    GiveUp
}

impl RetryDecision {
    /// Push a retry out to `floor` when the remote asked for a longer wait.
    pub fn not_before(self, floor: Option<DateTime<Utc>>) -> Self {
        match (self, floor) {
            (Self::RetryAt(at), Some(floor)) => Self::RetryAt(at.max(floor)),
            (decision, _) => decision
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            fork_notify_max_attempts: config.fork_notify_max_attempts
        }
    }

    pub fn max_attempts_for(&self, operation: SyncOperation) -> u32 {
        match operation {
            SyncOperation::ForkNotify => self.fork_notify_max_attempts,
            _ => self.max_attempts
        }
    }

    /// Delay after the `attempt`-th failure (1-based):
    /// `base * multiplier^(attempt - 1)`, clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let clamped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(clamped as u64)
    }

    /// `attempt` is the attempt count after recording the failure.
    pub fn on_transient_failure(
        &self,
        operation: SyncOperation,
        attempt: u32,
        now: DateTime<Utc>
    ) -> RetryDecision {
        if attempt >= self.max_attempts_for(operation) {
            return RetryDecision::GiveUp;
        }
        let delay = chrono::Duration::from_std(self.delay_for(attempt))
            .unwrap_or_else(|_| chrono::Duration::days(1));
        RetryDecision::RetryAt(now + delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            fork_notify_max_attempts: 2
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_default_policy_gives_up_on_third_failure() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        assert_eq!(
            policy.on_transient_failure(SyncOperation::Publish, 1, now),
            RetryDecision::RetryAt(now + chrono::Duration::seconds(2))
        );
        assert_eq!(
            policy.on_transient_failure(SyncOperation::Publish, 2, now),
            RetryDecision::RetryAt(now + chrono::Duration::seconds(4))
        );
        assert_eq!(
            policy.on_transient_failure(SyncOperation::Publish, 3, now),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_retry_after_floor_only_lengthens_delay() {
        // GIVEN a retry scheduled two seconds out
        let now = Utc::now();
        let decision = RetryDecision::RetryAt(now + chrono::Duration::seconds(2));

        // WHEN the remote asks for a longer or shorter wait
        let longer = decision.not_before(Some(now + chrono::Duration::seconds(120)));
        let shorter = decision.not_before(Some(now + chrono::Duration::seconds(1)));

        // THEN only the longer wait moves the schedule and give-up is kept
        assert_eq!(longer, RetryDecision::RetryAt(now + chrono::Duration::seconds(120)));
        assert_eq!(shorter, decision);
        assert_eq!(decision.not_before(None), decision);
        assert_eq!(
            RetryDecision::GiveUp.not_before(Some(now)),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_fork_notify_retries_once() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        assert!(matches!(
            policy.on_transient_failure(SyncOperation::ForkNotify, 1, now),
            RetryDecision::RetryAt(_)
        ));
        assert_eq!(
            policy.on_transient_failure(SyncOperation::ForkNotify, 2, now),
            RetryDecision::GiveUp
        );
    }
}
