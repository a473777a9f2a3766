//! Account lockout after repeated failed logins.
//!
//! For known subjects the failure counter and the lock decision are applied
//! by the subject store in one atomic step. Addresses without an account get
//! the same bookkeeping in the key-value store, keyed by a hash of the
//! address, so a lock never reveals whether an account exists. Lock checks
//! are pure functions of `lock_until` and the clock.

use std::sync::Arc;
use std::time::Duration;

use folio_core::{
    clock::seconds_until, normalize_email, Clock, FolioResult, LockoutSettings, LockoutState,
    StorageError, Subject, SubjectId, ThrottleError,
};
use folio_storage::{KeyValueStore, SubjectStore};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::{LOCKOUT_KEY_PREFIX, UNKNOWN_LOCKOUT_RETENTION_SECS};
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct LockoutPolicy {
    subjects: Arc<dyn SubjectStore>,
    unknown: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: LockoutSettings,
}

fn unknown_key(email: &str) -> String {
    let digest = Sha256::digest(normalize_email(email).as_bytes());
    format!("{}:{}", LOCKOUT_KEY_PREFIX, hex::encode(digest))
}

impl std::fmt::Debug for LockoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutPolicy")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LockoutPolicy {
    pub fn new(
        subjects: Arc<dyn SubjectStore>,
        unknown: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: LockoutSettings,
    ) -> Self {
        Self {
            subjects,
            unknown,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &LockoutSettings {
        &self.settings
    }

    /// Count a failed attempt; locks the subject on reaching the threshold.
    pub async fn record_failure(&self, subject_id: SubjectId) -> FolioResult<LockoutState> {
        let now = self.clock.now();
        let state = self
            .subjects
            .record_login_failure(
                subject_id,
                self.settings.threshold,
                self.settings.duration,
                now,
            )
            .await?;

        if self.observe_failure(&state) {
            warn!(
                %subject_id,
                failed_attempts = state.failed_attempts,
                lock_secs = self.settings.duration.as_secs(),
                "Account locked after repeated failures"
            );
        }
        Ok(state)
    }

    /// Lockout state for an address with no account.
    pub async fn unknown_state(&self, email: &str) -> FolioResult<LockoutState> {
        let key = unknown_key(email);
        let Some(bytes) = self.unknown.get(&key).await? else {
            return Ok(LockoutState::default());
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::Serialization {
                key,
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// `record_failure` for an address with no account.
    pub async fn record_unknown_failure(&self, email: &str) -> FolioResult<LockoutState> {
        let now = self.clock.now();
        let state = self.unknown_state(email).await?.after_failure(
            now,
            self.settings.threshold,
            self.settings.duration,
        );
        let key = unknown_key(email);
        let bytes = serde_json::to_vec(&state).map_err(|e| StorageError::Serialization {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let retention =
            Duration::from_secs(UNKNOWN_LOCKOUT_RETENTION_SECS).max(self.settings.duration);
        self.unknown.set(&key, bytes, retention).await?;

        if self.observe_failure(&state) {
            debug!(failed_attempts = state.failed_attempts, "Unknown address locked");
        }
        Ok(state)
    }

    /// Error with `ThrottleError::AccountLocked` if an address with no
    /// account is locked.
    pub async fn ensure_unknown_unlocked(&self, email: &str) -> FolioResult<()> {
        let state = self.unknown_state(email).await?;
        self.ensure_state_unlocked(&state)
    }

    /// Records metrics; true if this failure applied the lock.
    fn observe_failure(&self, state: &LockoutState) -> bool {
        if let Some(metrics) = metrics() {
            metrics.record_lockout_event("failure");
        }
        let locked = state.is_locked_at(self.clock.now())
            && state.failed_attempts == self.settings.threshold;
        if locked {
            if let Some(metrics) = metrics() {
                metrics.record_lockout_event("locked");
            }
        }
        locked
    }

    /// Reset the counter and clear any lock.
    pub async fn record_success(&self, subject_id: SubjectId) -> FolioResult<()> {
        self.subjects.clear_login_failures(subject_id).await?;
        if let Some(metrics) = metrics() {
            metrics.record_lockout_event("cleared");
        }
        info!(%subject_id, "Lockout state cleared");
        Ok(())
    }

    pub fn is_locked(&self, subject: &Subject) -> bool {
        subject.lockout.is_locked_at(self.clock.now())
    }

    /// Seconds until the subject's lock ends; zero if unlocked.
    pub fn remaining_lock_secs(&self, subject: &Subject) -> u64 {
        self.remaining_secs(&subject.lockout)
    }

    fn remaining_secs(&self, state: &LockoutState) -> u64 {
        let now = self.clock.now();
        match state.lock_until {
            Some(until) if until > now => seconds_until(now, until).max(1),
            _ => 0,
        }
    }

    /// Error with `ThrottleError::AccountLocked` if the subject is locked.
    pub fn ensure_unlocked(&self, subject: &Subject) -> FolioResult<()> {
        self.ensure_state_unlocked(&subject.lockout)
    }

    fn ensure_state_unlocked(&self, state: &LockoutState) -> FolioResult<()> {
        if state.is_locked_at(self.clock.now()) {
            if let Some(metrics) = metrics() {
                metrics.record_lockout_event("rejected");
            }
            return Err(ThrottleError::AccountLocked {
                retry_after_secs: self.remaining_secs(state),
            }
            .into());
        }
        Ok(())
    }
}
