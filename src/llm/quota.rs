//! Per-user usage quotas for the hosted model APIs.

use crate::config::QuotaConfig;
use crate::error::{BotError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window limiter: each user gets `max_calls` within any `window`.
#[derive(Debug)]
pub struct QuotaLimiter {
    label: &'static str,
    config: QuotaConfig,
    calls: Mutex<HashMap<u64, VecDeque<Instant>>>,
}

impl QuotaLimiter {
    pub fn new(label: &'static str, config: QuotaConfig) -> Self {
        Self {
            label,
            config,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Take one call from `user_id`'s quota.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::QuotaExceeded`] when the window is full; nothing is consumed then.
    pub fn try_acquire(&self, user_id: u64) -> Result<()> {
        self.try_acquire_at(user_id, Instant::now())
    }

    fn try_acquire_at(&self, user_id: u64, now: Instant) -> Result<()> {
        let mut calls = self.calls.lock().map_err(|_| {
            BotError::QuotaExceeded(format!("{} quota state unavailable", self.label))
        })?;
        let window = self.config.window;
        calls.retain(|_, recent| {
            prune(recent, now, window);
            !recent.is_empty()
        });
        let recent = calls.entry(user_id).or_default();

        if recent.len() >= self.config.max_calls as usize {
            let retry_after = recent
                .front()
                .map(|&oldest| self.config.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or_default();
            tracing::debug!(user_id, label = self.label, "Quota exhausted");
            return Err(BotError::QuotaExceeded(format!(
                "{} limit of {} per {} reached, try again in {}",
                self.label,
                self.config.max_calls,
                describe(self.config.window),
                describe(retry_after),
            )));
        }

        recent.push_back(now);
        Ok(())
    }

    /// Calls `user_id` may still make in the current window.
    pub fn remaining(&self, user_id: u64) -> u32 {
        let now = Instant::now();
        let Ok(calls) = self.calls.lock() else {
            return 0;
        };
        let used = calls
            .get(&user_id)
            .map(|recent| {
                recent
                    .iter()
                    .filter(|&&t| now.duration_since(t) < self.config.window)
                    .count()
            })
            .unwrap_or(0);
        self.config.max_calls.saturating_sub(used as u32)
    }

    /// Number of users currently holding quota state.
    pub fn tracked_users(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

/// Drop timestamps that left the window.
fn prune(recent: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = recent.front() {
        if now.duration_since(oldest) >= window {
            recent.pop_front();
        } else {
            break;
        }
    }
}

fn describe(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h", secs.div_ceil(3600))
    } else if secs >= 60 {
        format!("{}m", secs.div_ceil(60))
    } else {
        format!("{}s", secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_calls: u32, window_secs: u64) -> QuotaLimiter {
        QuotaLimiter::new(
            "chat",
            QuotaConfig {
                max_calls,
                window: Duration::from_secs(window_secs),
            },
        )
    }

    #[test]
    fn test_allows_up_to_limit() {
        let quota = limiter(3, 60);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(quota.try_acquire_at(1, now).is_ok());
        }
        let err = quota.try_acquire_at(1, now).unwrap_err();
        assert!(matches!(err, BotError::QuotaExceeded(_)));
    }

    #[test]
    fn test_users_are_independent() {
        let quota = limiter(1, 60);
        let now = Instant::now();

        assert!(quota.try_acquire_at(1, now).is_ok());
        assert!(quota.try_acquire_at(2, now).is_ok());
        assert!(quota.try_acquire_at(1, now).is_err());
        assert_eq!(quota.remaining(3), 1);
    }

    #[test]
    fn test_window_slides() {
        let quota = limiter(2, 60);
        let start = Instant::now();

        assert!(quota.try_acquire_at(1, start).is_ok());
        assert!(quota.try_acquire_at(1, start + Duration::from_secs(30)).is_ok());
        assert!(quota.try_acquire_at(1, start + Duration::from_secs(59)).is_err());
        // The first call leaves the window
        assert!(quota.try_acquire_at(1, start + Duration::from_secs(60)).is_ok());
        assert!(quota.try_acquire_at(1, start + Duration::from_secs(61)).is_err());
    }

    #[test]
    fn test_idle_users_are_forgotten() {
        let quota = limiter(1, 60);
        let start = Instant::now();

        for user in 1..=3 {
            assert!(quota.try_acquire_at(user, start).is_ok());
        }
        assert_eq!(quota.tracked_users(), 3);

        // Everyone else's calls have left the window
        assert!(quota.try_acquire_at(4, start + Duration::from_secs(61)).is_ok());
        assert_eq!(quota.tracked_users(), 1);

        // A rejected call does not add an entry either
        assert!(quota.try_acquire_at(4, start + Duration::from_secs(62)).is_err());
        assert_eq!(quota.tracked_users(), 1);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(Duration::from_secs(86_400)), "24h");
        assert_eq!(describe(Duration::from_secs(90)), "2m");
        assert_eq!(describe(Duration::from_millis(10)), "1s");
    }
}
