//! Categorized retry limits and backoff delays.

use crate::error::ErrorCategory;
use rand::Rng;
use std::time::Duration;

/// The retry parameters for one failure category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    /// Total attempts allowed under this category, including the first.
    pub max_attempts: u32,
    /// The delay before the second attempt; doubles per attempt after.
    pub base_delay: Duration,
    /// Fraction of the computed delay added as uniform random jitter.
    pub jitter: f64,
}

/// Whether and when a failed attempt should be repeated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryDecision {
    /// `true` when another attempt is allowed under the category's limit.
    pub should_retry: bool,
    /// How long to wait first. Only meaningful when [`Self::should_retry`].
    pub delay: Duration,
}

impl RetryDecision {
    fn give_up() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Context-aware retry logic with exponential backoff.
///
/// The policy is consulted once per failed attempt, never once per video:
/// each failure is re-classified against its own diagnostic text, so an
/// item that fails twice for different reasons is judged under two
/// different categories' limits while sharing one attempt counter.
pub struct RetryPolicy;

impl RetryPolicy {
    /// The strategy table, keyed by failure category.
    pub fn strategy_for(category: ErrorCategory) -> RetryStrategy {
        match category {
            ErrorCategory::BotDetection => RetryStrategy {
                max_attempts: 2,
                base_delay: Duration::from_secs(60),
                jitter: 0.2,
            },
            ErrorCategory::RateLimit => RetryStrategy {
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
                jitter: 0.1,
            },
            ErrorCategory::NetworkError => RetryStrategy {
                max_attempts: 5,
                base_delay: Duration::from_secs(3),
                jitter: 0.1,
            },
            ErrorCategory::MergeFailed => RetryStrategy {
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
                jitter: 0.1,
            },
            // Permanent conditions get a single attempt and no backoff.
            ErrorCategory::VideoUnavailable | ErrorCategory::Cancelled => RetryStrategy {
                max_attempts: 1,
                base_delay: Duration::ZERO,
                jitter: 0.0,
            },
            ErrorCategory::Timeout | ErrorCategory::Generic => RetryStrategy {
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
                jitter: 0.1,
            },
        }
    }

    /// Classifies a failure and decides whether attempt `attempt + 1` is
    /// worth making. `attempt` is the 1-based number just completed.
    pub fn evaluate(diagnostic: &str, attempt: u32) -> (ErrorCategory, RetryDecision) {
        let category = ErrorCategory::classify(diagnostic);
        (category, Self::decide(category, attempt))
    }

    /// Decides for an already-classified failure.
    pub fn decide(category: ErrorCategory, attempt: u32) -> RetryDecision {
        let strategy = Self::strategy_for(category);

        if category.is_permanent() || attempt >= strategy.max_attempts {
            return RetryDecision::give_up();
        }

        RetryDecision {
            should_retry: true,
            delay: backoff_delay(attempt, strategy.base_delay, strategy.jitter),
        }
    }
}

/// `base * 2^(attempt-1)` plus a uniform jitter in `[0, delay * jitter]`.
fn backoff_delay(attempt: u32, base_delay: Duration, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base_delay.as_secs_f64() * f64::from(2u32.pow(exponent));

    let max_jitter = delay * jitter;
    let applied = if max_jitter > 0.0 {
        rand::rng().random_range(0.0..=max_jitter)
    } else {
        0.0
    };

    Duration::from_secs_f64(delay + applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_the_jitter_envelope() {
        let base = Duration::from_secs(5);
        for attempt in 1..=4 {
            let floor = 5.0 * f64::from(2u32.pow(attempt - 1));
            let ceiling = floor * 1.1;

            for _ in 0..50 {
                let delay = backoff_delay(attempt, base, 0.1).as_secs_f64();
                assert!(delay >= floor, "attempt {}: {} < {}", attempt, delay, floor);
                assert!(
                    delay <= ceiling,
                    "attempt {}: {} > {}",
                    attempt,
                    delay,
                    ceiling
                );
            }
        }
    }

    #[test]
    fn delay_is_monotonically_non_decreasing_across_attempts() {
        // With jitter <= 1.0 the floor of attempt n+1 is at least the
        // ceiling of attempt n, so any two samples are ordered.
        for attempt in 1..=4 {
            let ceiling = 3.0 * f64::from(2u32.pow(attempt - 1)) * 1.1;
            let next_floor = 3.0 * f64::from(2u32.pow(attempt));
            assert!(next_floor >= ceiling);
        }
    }

    #[test]
    fn attempts_are_capped_per_category() {
        let cases = [
            (ErrorCategory::BotDetection, 2),
            (ErrorCategory::RateLimit, 3),
            (ErrorCategory::NetworkError, 5),
            (ErrorCategory::MergeFailed, 3),
            (ErrorCategory::Generic, 3),
        ];

        for (category, limit) in cases {
            for attempt in 1..limit {
                assert!(
                    RetryPolicy::decide(category, attempt).should_retry,
                    "{} attempt {}",
                    category,
                    attempt
                );
            }
            assert!(!RetryPolicy::decide(category, limit).should_retry);
            assert!(!RetryPolicy::decide(category, limit + 1).should_retry);
        }
    }

    #[test]
    fn permanent_categories_are_never_retried() {
        assert!(!RetryPolicy::decide(ErrorCategory::VideoUnavailable, 1).should_retry);
        assert!(!RetryPolicy::decide(ErrorCategory::Cancelled, 1).should_retry);
    }

    #[test]
    fn evaluate_classifies_and_decides_in_one_step() {
        let (category, decision) = RetryPolicy::evaluate("HTTP Error 429: Too Many Requests", 1);
        assert_eq!(category, ErrorCategory::RateLimit);
        assert!(decision.should_retry);
        assert!(decision.delay >= Duration::from_secs(5));

        let (category, decision) = RetryPolicy::evaluate("ERROR: Private video", 1);
        assert_eq!(category, ErrorCategory::VideoUnavailable);
        assert!(!decision.should_retry);
    }

    #[test]
    fn bot_detection_backs_off_hard() {
        let decision = RetryPolicy::decide(ErrorCategory::BotDetection, 1);
        assert!(decision.should_retry);
        assert!(decision.delay >= Duration::from_secs(60));
        assert!(decision.delay <= Duration::from_secs_f64(60.0 * 1.2));
    }
}
