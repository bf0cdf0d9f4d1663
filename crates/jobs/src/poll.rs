//! Exponential-backoff policy for the result poll loop.
//!
//! While the service reports a job as still computing, the orchestrator
//! waits between fetches with increasing, jittered delays, and gives up
//! once the attempt cap or the deadline is exceeded.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Tunable parameters for polling a job's results.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay after the first "still computing" answer.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each attempt.
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (`0.2` = ±20%).
    pub jitter: f64,
    /// Maximum number of fetch attempts; `None` means unbounded.
    pub max_attempts: Option<u32>,
    /// Wall-clock budget measured from the first fetch; `None` means
    /// unbounded.
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: Some(600),
            deadline: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl PollConfig {
    /// Retry without waiting, capped at `max_attempts`.
    ///
    /// Only sensible against an in-process or rate-limited service.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: Some(max_attempts),
            deadline: None,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`PollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Spread `delay` randomly by up to `jitter` in either direction.
pub fn with_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let jitter = jitter.min(1.0);
    let factor = 1.0 + rand::rng().random_range(-jitter..=jitter);
    delay.mul_f64(factor.max(0.0))
}

/// Attempt and time accounting for one job's poll loop.
#[derive(Debug)]
pub struct PollBudget<'a> {
    config: &'a PollConfig,
    attempts: u32,
    started: Instant,
    delay: Duration,
}

impl<'a> PollBudget<'a> {
    pub fn start(config: &'a PollConfig) -> Self {
        Self {
            config,
            attempts: 0,
            started: Instant::now(),
            delay: config.initial_delay,
        }
    }

    /// Count a fetch attempt and return its 1-based number.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` when the budget is spent.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }

        let wait = with_jitter(self.delay, self.config.jitter);
        if let Some(deadline) = self.config.deadline {
            if self.started.elapsed() + wait >= deadline {
                return None;
            }
        }

        self.delay = next_delay(self.delay, self.config);
        Some(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
            max_attempts: None,
            deadline: None,
            ..Default::default()
        }
    }

    #[test]
    fn next_delay_doubles() {
        let d = next_delay(Duration::from_secs(1), &no_jitter());
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = PollConfig {
            max_delay: Duration::from_secs(10),
            ..no_jitter()
        };
        assert_eq!(next_delay(Duration::from_secs(8), &config), Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = no_jitter();
        let mut budget = PollBudget::start(&config);
        let expected = [1, 2, 4, 8, 16, 30, 30];

        for &expected_secs in &expected {
            budget.record_attempt();
            assert_eq!(budget.next_wait(), Some(Duration::from_secs(expected_secs)));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = with_jitter(base, 0.2);
            assert!(d >= Duration::from_millis(800) && d <= Duration::from_millis(1200));
        }
        assert_eq!(with_jitter(Duration::ZERO, 0.5), Duration::ZERO);
    }

    #[test]
    fn attempt_cap_exhausts_budget() {
        let config = PollConfig::immediate(3);
        let mut budget = PollBudget::start(&config);

        budget.record_attempt();
        assert_eq!(budget.next_wait(), Some(Duration::ZERO));
        budget.record_attempt();
        assert_eq!(budget.next_wait(), Some(Duration::ZERO));
        budget.record_attempt();
        assert_eq!(budget.next_wait(), None);
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn deadline_exhausts_budget() {
        let config = PollConfig {
            deadline: Some(Duration::from_millis(500)),
            ..no_jitter()
        };
        let mut budget = PollBudget::start(&config);
        budget.record_attempt();
        // The first wait alone (1s) would overrun the 500ms deadline.
        assert_eq!(budget.next_wait(), None);
    }
}
