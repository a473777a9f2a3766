//! Fixed-window rate limiting over the shared key-value store.
//!
//! One counter per `(action, identifier)`. The identifier is normalized and
//! hashed before it becomes part of a key, so raw emails never reach the
//! store or the logs. Backend errors propagate: the limiter fails closed.

use std::sync::Arc;
use std::time::Duration;

use folio_core::{
    clock::seconds_until, Clock, FolioResult, RateLimitAction, RateLimitSettings, ThrottleError,
    Timestamp, ValidationError,
};
use folio_storage::KeyValueStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::constants::RATE_LIMIT_KEY_PREFIX;
use crate::telemetry::metrics;

/// Outcome of one `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts left in the current window.
    pub remaining: u32,
    /// Zero when allowed; otherwise whole seconds until the window resets.
    pub retry_after_secs: u64,
    pub limit: u32,
    pub resets_at: Timestamp,
}

impl RateLimitDecision {
    /// Convert a denial into a throttling error.
    pub fn into_result(self, action: &str) -> FolioResult<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ThrottleError::RateLimited {
                action: action.to_string(),
                retry_after_secs: self.retry_after_secs,
            }
            .into())
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: RateLimitSettings,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Storage key for a counter. Identifiers are case- and whitespace-insensitive.
pub fn counter_key(action: &str, identifier: &str) -> String {
    let normalized = identifier.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!(
        "{}:{}:{}",
        RATE_LIMIT_KEY_PREFIX,
        action,
        hex::encode(digest)
    )
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: RateLimitSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Count one attempt and decide.
    ///
    /// Attempts `1..=max_attempts` in a window are allowed; later ones are
    /// denied until the window resets. Known and unknown identifiers are
    /// treated identically.
    pub async fn check(
        &self,
        action: &str,
        identifier: &str,
        max_attempts: u32,
        window: Duration,
    ) -> FolioResult<RateLimitDecision> {
        if max_attempts == 0 {
            return Err(ValidationError::InvalidValue {
                field: "max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if window.is_zero() {
            return Err(ValidationError::InvalidValue {
                field: "window".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        let key = counter_key(action, identifier);
        let counted = self
            .store
            .increment_window(&key, window)
            .await
            .inspect_err(|e| warn!(action, error = %e, "Rate limit store unavailable, denying"))?;

        let limit = u64::from(max_attempts);
        let allowed = counted.count <= limit;
        let remaining = limit.saturating_sub(counted.count) as u32;
        let retry_after_secs = if allowed {
            0
        } else {
            seconds_until(self.clock.now(), counted.resets_at).max(1)
        };

        if let Some(metrics) = metrics() {
            metrics.record_rate_limit(action, allowed);
        }
        if !allowed {
            debug!(action, retry_after_secs, "Rate limit exceeded");
        }

        Ok(RateLimitDecision {
            allowed,
            remaining,
            retry_after_secs,
            limit: max_attempts,
            resets_at: counted.resets_at,
        })
    }

    /// `check` with the configured policy for `action`.
    pub async fn check_action(
        &self,
        action: RateLimitAction,
        identifier: &str,
    ) -> FolioResult<RateLimitDecision> {
        let policy = self.settings.policy(action);
        self.check(action.as_str(), identifier, policy.max_attempts, policy.window)
            .await
    }

    /// `check_action`, turning a denial into `ThrottleError::RateLimited`.
    pub async fn enforce(
        &self,
        action: RateLimitAction,
        identifier: &str,
    ) -> FolioResult<RateLimitDecision> {
        self.check_action(action, identifier)
            .await?
            .into_result(action.as_str())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use folio_core::ManualClock;
    use folio_storage::InMemoryKeyValueStore;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Exactly `max` of `n` attempts within one window are allowed.
        #[test]
        fn prop_allows_exactly_max(max in 1u32..20, attempts in 1u32..40) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let allowed = runtime.block_on(async {
                let clock = Arc::new(ManualClock::starting_now());
                let store = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
                let limiter = RateLimiter::new(store, clock, RateLimitSettings::default());
                let mut allowed = 0u32;
                for _ in 0..attempts {
                    if limiter
                        .check("prop", "id", max, Duration::from_secs(60))
                        .await
                        .unwrap()
                        .allowed
                    {
                        allowed += 1;
                    }
                }
                allowed
            });
            prop_assert_eq!(allowed, attempts.min(max));
        }
    }
}
