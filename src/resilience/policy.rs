use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::ErrorRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

/// Immutable retry policy shared by every request of a controller
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "RetryPolicy::validate_delays"))]
pub struct RetryPolicy {
    #[serde(default)]
    pub strategy: RetryStrategy,
    #[serde(default = "RetryPolicy::default_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[serde(default = "RetryPolicy::default_base_delay_ms")]
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    #[serde(default = "RetryPolicy::default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "RetryPolicy::default_multiplier")]
    #[validate(range(min = 1.0))]
    pub multiplier: f64,
    #[serde(default = "RetryPolicy::default_jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            max_retries: Self::default_max_retries(),
            base_delay_ms: Self::default_base_delay_ms(),
            max_delay_ms: Self::default_max_delay_ms(),
            multiplier: Self::default_multiplier(),
            jitter: Self::default_jitter(),
        }
    }
}

impl RetryPolicy {
    fn default_max_retries() -> u32 {
        3
    }

    fn default_base_delay_ms() -> u64 {
        1000
    }

    fn default_max_delay_ms() -> u64 {
        30_000
    }

    fn default_multiplier() -> f64 {
        2.0
    }

    fn default_jitter() -> bool {
        true
    }

    fn validate_delays(&self) -> Result<(), ValidationError> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ValidationError::new("max_delay_below_base_delay"));
        }
        Ok(())
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based),
    /// capped at `max_delay_ms`, without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay_ms as f64;
        let delay = match self.strategy {
            RetryStrategy::Fixed => base,
            RetryStrategy::Linear => base * attempt as f64,
            RetryStrategy::Exponential => base * self.multiplier.powi(attempt as i32 - 1),
        };
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// The wait actually applied after a failed attempt.
    ///
    /// A server-provided `Retry-After` replaces the computed delay and is
    /// used as is (still capped); otherwise jitter scales the delay by a
    /// factor in `[0.5, 1.0]`.
    pub fn next_delay(&self, attempt: u32, record: &ErrorRecord) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        if let Some(seconds) = record.retry_after_seconds {
            return Duration::from_secs(seconds).min(max);
        }

        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ErrorKind;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            strategy,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_strategies() {
        let test_cases = [
            (RetryStrategy::Fixed, [100, 100, 100, 100]),
            (RetryStrategy::Linear, [100, 200, 300, 400]),
            (RetryStrategy::Exponential, [100, 200, 400, 800]),
        ];

        for (strategy, expected) in test_cases {
            let policy = policy(strategy);
            for (i, ms) in expected.iter().enumerate() {
                assert_eq!(
                    policy.delay_for_attempt(i as u32 + 1),
                    Duration::from_millis(*ms),
                    "{strategy:?} attempt {}",
                    i + 1
                );
            }
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy(RetryStrategy::Exponential);
        assert_eq!(policy.delay_for_attempt(8), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy(RetryStrategy::Fixed)
        };
        let record = ErrorRecord::new(ErrorKind::Server, Some(500), None, None);
        for _ in 0..100 {
            let delay = policy.next_delay(1, &record);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_retry_after_replaces_delay() {
        let policy = policy(RetryStrategy::Exponential);
        let record = ErrorRecord::new(ErrorKind::RateLimited, Some(429), Some(60), None);
        assert_eq!(policy.next_delay(1, &record), Duration::from_millis(1000));

        let policy = RetryPolicy {
            max_delay_ms: 120_000,
            ..policy
        };
        assert_eq!(policy.next_delay(1, &record), Duration::from_secs(60));
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());

        let invalid = RetryPolicy {
            max_delay_ms: 10,
            ..policy(RetryStrategy::Fixed)
        };
        assert!(invalid.validate().is_err());
    }
}
