//! Sliding-window brute-force lockout for passport-code attempts.
//!
//! State is in-process: a horizontally scaled deployment enforces the limits
//! per process, not globally. That is an accepted limitation until the
//! backing `StateStore` is moved to an external store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::debug;

use super::kv::{MemoryStore, StateStore};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(10 * 60);
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_window: DEFAULT_ATTEMPT_WINDOW,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
        }
    }
}

/// Per-subject attempt bookkeeping. Subjects are passport codes or client
/// addresses; raw values never leave this module via logs.
#[derive(Clone, Debug)]
pub struct LockoutRecord {
    attempt_count: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

/// Result of recording a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutStatus {
    pub locked: bool,
    pub remaining: Option<Duration>,
}

pub struct LockoutGuard {
    store: Arc<dyn StateStore<String, LockoutRecord>>,
    policy: LockoutPolicy,
}

impl LockoutGuard {
    #[must_use]
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            policy,
        }
    }

    /// Remaining lock time for a subject, if an active lock exists.
    #[must_use]
    pub fn active_lock(&self, subject: &str) -> Option<Duration> {
        let record = self.store.get(&subject.to_string())?;
        let locked_until = record.locked_until?;
        let now = Instant::now();
        if locked_until > now {
            Some(locked_until - now)
        } else {
            None
        }
    }

    /// Record a failed attempt and report whether the subject is now locked.
    ///
    /// Increment and threshold check happen inside one `mutate` call so two
    /// concurrent failures cannot both observe "not yet locked".
    pub fn check_and_record_failure(&self, subject: &str) -> LockoutStatus {
        let policy = self.policy;
        let now = Instant::now();
        let stored = self.store.mutate(&subject.to_string(), &mut |current| {
            let mut record = match current {
                Some(record) => record,
                None => LockoutRecord {
                    attempt_count: 0,
                    window_start: now,
                    locked_until: None,
                },
            };

            if let Some(locked_until) = record.locked_until {
                if locked_until > now {
                    // Attempts during an active lock do not extend it.
                    return Some(record);
                }
                // Lock expired: start a fresh window with this failure.
                record = LockoutRecord {
                    attempt_count: 0,
                    window_start: now,
                    locked_until: None,
                };
            }

            if now.duration_since(record.window_start) > policy.attempt_window {
                record.attempt_count = 0;
                record.window_start = now;
            }

            record.attempt_count += 1;
            if record.attempt_count >= policy.max_attempts {
                record.locked_until = Some(now + policy.lockout_duration);
            }
            Some(record)
        });

        match stored.and_then(|record| record.locked_until) {
            Some(locked_until) if locked_until > now => LockoutStatus {
                locked: true,
                remaining: Some(locked_until - now),
            },
            _ => LockoutStatus {
                locked: false,
                remaining: None,
            },
        }
    }

    /// A success clears the record entirely; the next failure starts a fresh
    /// window, not a partially spent one.
    pub fn record_success(&self, subject: &str) {
        self.store.remove(&subject.to_string());
    }

    /// Drop records whose lock expired and whose window has passed.
    pub fn sweep(&self) -> usize {
        let policy = self.policy;
        let now = Instant::now();
        self.store.sweep(&|_, record: &LockoutRecord| {
            if record.locked_until.is_some_and(|until| until > now) {
                return true;
            }
            now.duration_since(record.window_start) <= policy.attempt_window
        })
    }

    #[must_use]
    pub fn tracked_subjects(&self) -> usize {
        self.store.len()
    }
}

/// Periodic sweep, independent of request traffic.
pub fn spawn_sweeper(guard: Arc<LockoutGuard>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // First tick completes immediately; skip it so the initial sweep
        // happens one full period after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = guard.sweep();
            if removed > 0 {
                debug!("Lockout sweep removed {removed} stale records");
            }
        }
    });
}
