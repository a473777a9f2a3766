//! Subject records and lockout state.

use crate::clock::add_duration;
use crate::{SubjectId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failed-login bookkeeping attached to a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub lock_until: Option<Timestamp>,
}

impl LockoutState {
    /// Locked iff `lock_until` is set and still in the future.
    pub fn is_locked_at(&self, now: Timestamp) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }

    /// A lock was applied and has since run out.
    pub fn lock_elapsed_at(&self, now: Timestamp) -> bool {
        self.lock_until.is_some_and(|until| until <= now)
    }

    /// State after one more failed attempt.
    ///
    /// Counting restarts once a previous lock has run out, so an expired lock
    /// grants a fresh `threshold` attempts.
    pub fn after_failure(&self, now: Timestamp, threshold: u32, lock_duration: Duration) -> Self {
        let (previous, carried_lock) = if self.lock_elapsed_at(now) {
            (0, None)
        } else {
            (self.failed_attempts, self.lock_until)
        };
        let failed_attempts = previous.saturating_add(1);
        let lock_until = if failed_attempts >= threshold {
            Some(add_duration(now, lock_duration))
        } else {
            carried_lock
        };
        Self {
            failed_attempts,
            lock_until,
        }
    }

    pub fn cleared() -> Self {
        Self::default()
    }
}

/// An account holder as seen by the infrastructure core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: SubjectId,
    /// Normalized with [`normalize_email`].
    pub email: String,
    /// Self-describing credential hash (PHC string).
    pub credential_hash: String,
    pub email_verified_at: Option<Timestamp>,
    pub lockout: LockoutState,
    pub created_at: Timestamp,
}

impl Subject {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// Lowercase and trim an email address so lookups and rate-limit keys agree.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
