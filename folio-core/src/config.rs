//! Configuration types

use crate::{ConfigError, FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Compute cache settings and per-operation TTLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub default_ttl: Duration,
    /// Upper bound on a single compute function invocation.
    pub compute_timeout: Duration,
    /// Let concurrent misses on one key wait for a single compute.
    pub coalesce_misses: bool,
    pub generation_ttl: Duration,
    pub search_ttl: Duration,
    pub metadata_ttl: Duration,
    pub similarity_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            compute_timeout: Duration::from_secs(30),
            coalesce_misses: true,
            generation_ttl: Duration::from_secs(7 * 24 * 3600),
            search_ttl: Duration::from_secs(24 * 3600),
            metadata_ttl: Duration::from_secs(30 * 24 * 3600),
            similarity_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSettings {
    pub verify_email_ttl: Duration,
    pub reset_password_ttl: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            verify_email_ttl: Duration::from_secs(24 * 3600),
            reset_password_ttl: Duration::from_secs(3600),
        }
    }
}

/// Actions guarded by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitAction {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    VerifyEmail,
    Generation,
    Research,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::Login => "login",
            RateLimitAction::Register => "register",
            RateLimitAction::ForgotPassword => "forgot-password",
            RateLimitAction::ResetPassword => "reset-password",
            RateLimitAction::VerifyEmail => "verify-email",
            RateLimitAction::Generation => "generation",
            RateLimitAction::Research => "research",
        }
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `max_attempts` per fixed `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub login: RateLimitPolicy,
    pub register: RateLimitPolicy,
    pub forgot_password: RateLimitPolicy,
    pub reset_password: RateLimitPolicy,
    pub verify_email: RateLimitPolicy,
    pub generation: RateLimitPolicy,
    pub research: RateLimitPolicy,
}

impl RateLimitSettings {
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        match action {
            RateLimitAction::Login => self.login,
            RateLimitAction::Register => self.register,
            RateLimitAction::ForgotPassword => self.forgot_password,
            RateLimitAction::ResetPassword => self.reset_password,
            RateLimitAction::VerifyEmail => self.verify_email,
            RateLimitAction::Generation => self.generation,
            RateLimitAction::Research => self.research,
        }
    }

    fn all(&self) -> [(RateLimitAction, RateLimitPolicy); 7] {
        [
            RateLimitAction::Login,
            RateLimitAction::Register,
            RateLimitAction::ForgotPassword,
            RateLimitAction::ResetPassword,
            RateLimitAction::VerifyEmail,
            RateLimitAction::Generation,
            RateLimitAction::Research,
        ]
        .map(|action| (action, self.policy(action)))
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 3600;
        Self {
            login: RateLimitPolicy::new(5, Duration::from_secs(15 * MINUTE)),
            register: RateLimitPolicy::new(5, Duration::from_secs(HOUR)),
            forgot_password: RateLimitPolicy::new(3, Duration::from_secs(HOUR)),
            reset_password: RateLimitPolicy::new(5, Duration::from_secs(HOUR)),
            verify_email: RateLimitPolicy::new(5, Duration::from_secs(HOUR)),
            generation: RateLimitPolicy::new(10, Duration::from_secs(MINUTE)),
            research: RateLimitPolicy::new(30, Duration::from_secs(MINUTE)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockoutSettings {
    pub threshold: u32,
    pub duration: Duration,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub min_password_length: usize,
    pub max_password_length: usize,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            min_password_length: 8,
            max_password_length: 256,
        }
    }
}

/// Retry configuration for external calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based), capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = f64::from(self.backoff_multiplier).powi(retry.min(i32::MAX as u32) as i32);
        let nanos = self.initial_backoff.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos.max(0.0).round() as u64)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub max_concurrency: usize,
    pub max_tasks: usize,
    /// Bound on one attempt of one task.
    pub task_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_tasks: 32,
            task_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSettings {
    pub max_conflict_retries: u32,
    pub max_snapshot_bytes: usize,
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            max_snapshot_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolioConfig {
    pub cache: CacheSettings,
    pub tokens: TokenSettings,
    pub rate_limits: RateLimitSettings,
    pub lockout: LockoutSettings,
    pub accounts: AccountSettings,
    pub batch: BatchSettings,
    pub versions: VersionSettings,
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> FolioError {
    FolioError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn require_positive(field: &str, value: Duration) -> FolioResult<()> {
    if value.is_zero() {
        return Err(invalid(field, format!("{:?}", value), "must be positive"));
    }
    Ok(())
}

impl FolioConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(FolioError::Config) naming the first bad field.
    pub fn validate(&self) -> FolioResult<()> {
        require_positive("cache.default_ttl", self.cache.default_ttl)?;
        require_positive("cache.compute_timeout", self.cache.compute_timeout)?;
        require_positive("cache.generation_ttl", self.cache.generation_ttl)?;
        require_positive("cache.search_ttl", self.cache.search_ttl)?;
        require_positive("cache.metadata_ttl", self.cache.metadata_ttl)?;
        require_positive("cache.similarity_ttl", self.cache.similarity_ttl)?;

        require_positive("tokens.verify_email_ttl", self.tokens.verify_email_ttl)?;
        require_positive("tokens.reset_password_ttl", self.tokens.reset_password_ttl)?;

        for (action, policy) in self.rate_limits.all() {
            if policy.max_attempts == 0 {
                return Err(invalid(
                    &format!("rate_limits.{}.max_attempts", action),
                    policy.max_attempts,
                    "max_attempts must be at least 1",
                ));
            }
            require_positive(&format!("rate_limits.{}.window", action), policy.window)?;
        }

        if self.lockout.threshold == 0 {
            return Err(invalid(
                "lockout.threshold",
                self.lockout.threshold,
                "threshold must be at least 1",
            ));
        }
        require_positive("lockout.duration", self.lockout.duration)?;

        if self.accounts.min_password_length == 0
            || self.accounts.min_password_length > self.accounts.max_password_length
        {
            return Err(invalid(
                "accounts.min_password_length",
                self.accounts.min_password_length,
                "must be at least 1 and not exceed max_password_length",
            ));
        }

        if self.batch.max_concurrency == 0 {
            return Err(invalid(
                "batch.max_concurrency",
                self.batch.max_concurrency,
                "max_concurrency must be at least 1",
            ));
        }
        if self.batch.max_tasks == 0 {
            return Err(invalid(
                "batch.max_tasks",
                self.batch.max_tasks,
                "max_tasks must be at least 1",
            ));
        }
        require_positive("batch.task_timeout", self.batch.task_timeout)?;
        if self.batch.retry.backoff_multiplier < 1.0 || !self.batch.retry.backoff_multiplier.is_finite() {
            return Err(invalid(
                "batch.retry.backoff_multiplier",
                self.batch.retry.backoff_multiplier,
                "backoff_multiplier must be at least 1.0",
            ));
        }
        if self.batch.retry.initial_backoff > self.batch.retry.max_backoff {
            return Err(invalid(
                "batch.retry.initial_backoff",
                format!("{:?}", self.batch.retry.initial_backoff),
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if self.versions.max_snapshot_bytes == 0 {
            return Err(invalid(
                "versions.max_snapshot_bytes",
                self.versions.max_snapshot_bytes,
                "max_snapshot_bytes must be positive",
            ));
        }

        Ok(())
    }
}
