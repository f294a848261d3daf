//! Exponential backoff shared by dialing and sending.

use crate::config::duration_ms;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    #[serde(with = "duration_ms")]
    pub initial: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration_ms")]
    pub max: Duration,
    /// `None` retries forever, with the delay capped at `max`
    pub max_attempts: Option<u32>,
    /// Fraction in `0.0..=1.0` by which a delay may be shortened at random
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Dialing and re-dialing the daemon socket.
    pub fn reconnect() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            max_attempts: None,
            jitter: 0.2,
        }
    }

    /// Retrying a failed frame write before giving up on the connection.
    pub fn send_retry() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(200),
            max_attempts: Some(5),
            jitter: 0.2,
        }
    }

    pub fn start(&self) -> Backoff {
        Backoff::new(*self)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

/// Running state of one retry sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.policy.max_attempts {
            if self.attempts >= max_attempts {
                return None;
            }
        }
        self.attempts = self.attempts.saturating_add(1);

        let delay = std::cmp::min(self.current, self.policy.max);
        let next = self.current.checked_mul(2).unwrap_or(self.policy.max);
        self.current = std::cmp::min(next, self.policy.max);
        Some(self.jittered(delay))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial;
        self.attempts = 0;
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        let shrink = rand::thread_rng().gen_range(0.0..=jitter);
        delay.mul_f64(1.0 - shrink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(max_attempts: Option<u32>) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            max_attempts,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = exact(None).start();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn test_backoff_exhausts_and_resets() {
        let mut backoff = exact(Some(2)).start();
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            jitter: 0.5,
            ..exact(None)
        };
        let mut backoff = policy.start();
        for _ in 0..100 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= policy.max);
        }

        let mut first = policy.start();
        let delay = first.next_delay().unwrap();
        assert!(delay >= Duration::from_millis(5) && delay <= Duration::from_millis(10));
    }

    #[test]
    fn test_policy_serializes_durations_as_millis() {
        let json = serde_json::to_value(BackoffPolicy::send_retry()).unwrap();
        assert_eq!(json["initial"], 10);
        assert_eq!(json["max"], 200);
        assert_eq!(json["max_attempts"], 5);
    }
}
