//! Subprocess restart policies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff is clamped to this window regardless of policy parameters.
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Restart on any exit.
    Always,
    /// Restart only on non-zero exit.
    OnFailure,
    /// Never restart; the supervisor exits with the child.
    Never,
    Custom {
        max_attempts: u32,
        base_delay_secs: u64,
        multiplier: u32,
        /// Stable uptime after which the attempt counter resets.
        reset_window_secs: u64,
    },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::OnFailure
    }
}

/// Decides whether (and when) to restart after each exit.
pub struct RestartTracker {
    policy: RestartPolicy,
    attempts: u32,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `None` means do not restart. `Some(delay)` schedules a restart
    /// after the clamped backoff.
    pub fn next_restart(&mut self, exit_ok: bool, uptime: Duration) -> Option<Duration> {
        let (restart, max_attempts, base, multiplier, reset_window) = match &self.policy {
            RestartPolicy::Always => (true, u32::MAX, Duration::from_secs(1), 2u32, Duration::from_secs(60)),
            RestartPolicy::OnFailure => {
                (!exit_ok, u32::MAX, Duration::from_secs(1), 2, Duration::from_secs(60))
            }
            RestartPolicy::Never => (false, 0, Duration::ZERO, 1, Duration::ZERO),
            RestartPolicy::Custom {
                max_attempts,
                base_delay_secs,
                multiplier,
                reset_window_secs,
            } => (
                true,
                *max_attempts,
                Duration::from_secs(*base_delay_secs),
                *multiplier,
                Duration::from_secs(*reset_window_secs),
            ),
        };

        if !restart {
            return None;
        }
        // A stretch of stable uptime forgives earlier crashes
        if uptime >= reset_window && !reset_window.is_zero() {
            self.attempts = 0;
        }
        if self.attempts >= max_attempts {
            return None;
        }
        let factor = multiplier.max(1).saturating_pow(self.attempts.min(16));
        let delay = base.saturating_mul(factor);
        self.attempts += 1;
        Some(delay.clamp(MIN_BACKOFF, MAX_BACKOFF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_does_not_restart() {
        let mut tracker = RestartTracker::new(RestartPolicy::Never);
        assert_eq!(tracker.next_restart(false, Duration::ZERO), None);
    }

    #[test]
    fn test_on_failure_ignores_clean_exit() {
        let mut tracker = RestartTracker::new(RestartPolicy::OnFailure);
        assert_eq!(tracker.next_restart(true, Duration::from_secs(5)), None);
        assert!(tracker.next_restart(false, Duration::from_secs(5)).is_some());
    }

    #[test]
    fn test_always_restarts_on_clean_exit() {
        let mut tracker = RestartTracker::new(RestartPolicy::Always);
        assert!(tracker.next_restart(true, Duration::ZERO).is_some());
    }

    #[test]
    fn test_backoff_grows_and_clamps() {
        let mut tracker = RestartTracker::new(RestartPolicy::Custom {
            max_attempts: 20,
            base_delay_secs: 1,
            multiplier: 10,
            reset_window_secs: 3600,
        });
        let first = tracker.next_restart(false, Duration::ZERO).unwrap();
        let second = tracker.next_restart(false, Duration::ZERO).unwrap();
        let third = tracker.next_restart(false, Duration::ZERO).unwrap();
        assert_eq!(first, Duration::from_secs(1));
        assert_eq!(second, Duration::from_secs(10));
        assert_eq!(third, Duration::from_secs(100));
        let fourth = tracker.next_restart(false, Duration::ZERO).unwrap();
        assert_eq!(fourth, MAX_BACKOFF);
    }

    #[test]
    fn test_attempt_budget_exhausts() {
        let mut tracker = RestartTracker::new(RestartPolicy::Custom {
            max_attempts: 2,
            base_delay_secs: 1,
            multiplier: 2,
            reset_window_secs: 3600,
        });
        assert!(tracker.next_restart(false, Duration::ZERO).is_some());
        assert!(tracker.next_restart(false, Duration::ZERO).is_some());
        assert_eq!(tracker.next_restart(false, Duration::ZERO), None);
    }

    #[test]
    fn test_stable_uptime_resets_attempts() {
        let mut tracker = RestartTracker::new(RestartPolicy::Custom {
            max_attempts: 2,
            base_delay_secs: 1,
            multiplier: 2,
            reset_window_secs: 60,
        });
        tracker.next_restart(false, Duration::ZERO).unwrap();
        tracker.next_restart(false, Duration::ZERO).unwrap();
        // Ran stable past the window: counter resets
        assert!(tracker.next_restart(false, Duration::from_secs(120)).is_some());
        assert_eq!(tracker.attempts(), 1);
    }
}
