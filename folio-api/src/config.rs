//! API Configuration Module
//!
//! Server binding, per-IP request throttling and overrides of the core
//! `FolioConfig`. Configuration is loaded from environment variables with
//! defaults suitable for development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use folio_core::{FolioConfig, FolioResult};

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_IP_RATE_LIMIT_BURST, DEFAULT_IP_RATE_LIMIT_PER_MINUTE,
    DEFAULT_PORT,
};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Server
    // ========================================================================
    pub bind_host: String,
    pub port: u16,

    // ========================================================================
    // Per-IP throttling (coarse, ahead of every route)
    // ========================================================================
    /// Whether the per-IP throttle is enabled.
    pub ip_rate_limit_enabled: bool,

    /// Requests per minute per client IP.
    pub ip_rate_limit_per_minute: u32,

    /// Burst capacity above the steady rate.
    pub ip_rate_limit_burst: u32,

    // ========================================================================
    // Core settings
    // ========================================================================
    pub folio: FolioConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            ip_rate_limit_enabled: true,
            ip_rate_limit_per_minute: DEFAULT_IP_RATE_LIMIT_PER_MINUTE,
            ip_rate_limit_burst: DEFAULT_IP_RATE_LIMIT_BURST,
            folio: FolioConfig::default(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    lookup(key).map(|s| !matches!(s.trim().to_lowercase().as_str(), "false" | "0" | "no"))
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    parsed::<u64>(lookup, key).map(Duration::from_secs)
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `FOLIO_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` / `FOLIO_API_PORT`: Listen port (default: 3000)
    /// - `FOLIO_IP_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `FOLIO_IP_RATE_LIMIT_PER_MINUTE`: Requests per minute per IP (default: 300)
    /// - `FOLIO_IP_RATE_LIMIT_BURST`: Burst capacity (default: 30)
    /// - `FOLIO_CACHE_COMPUTE_TIMEOUT_SECS`: Timeout for one cached computation
    /// - `FOLIO_CACHE_COALESCE_MISSES`: Share one compute across concurrent misses
    /// - `FOLIO_LOGIN_MAX_ATTEMPTS` / `FOLIO_LOGIN_WINDOW_SECS`: Login rate limit
    /// - `FOLIO_LOCKOUT_THRESHOLD` / `FOLIO_LOCKOUT_DURATION_SECS`: Account lockout
    /// - `FOLIO_RESET_TOKEN_TTL_SECS` / `FOLIO_VERIFY_TOKEN_TTL_SECS`: Token lifetimes
    /// - `FOLIO_BATCH_MAX_CONCURRENCY`: Parallel generation tasks per batch
    /// - `FOLIO_BATCH_TASK_TIMEOUT_SECS`: Timeout for one task attempt
    /// - `FOLIO_BATCH_MAX_RETRIES`: Retries for transient task failures
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut folio = defaults.folio;

        if let Some(timeout) = seconds(&lookup, "FOLIO_CACHE_COMPUTE_TIMEOUT_SECS") {
            folio.cache.compute_timeout = timeout;
        }
        if let Some(coalesce) = flag(&lookup, "FOLIO_CACHE_COALESCE_MISSES") {
            folio.cache.coalesce_misses = coalesce;
        }
        if let Some(max_attempts) = parsed(&lookup, "FOLIO_LOGIN_MAX_ATTEMPTS") {
            folio.rate_limits.login.max_attempts = max_attempts;
        }
        if let Some(window) = seconds(&lookup, "FOLIO_LOGIN_WINDOW_SECS") {
            folio.rate_limits.login.window = window;
        }
        if let Some(threshold) = parsed(&lookup, "FOLIO_LOCKOUT_THRESHOLD") {
            folio.lockout.threshold = threshold;
        }
        if let Some(duration) = seconds(&lookup, "FOLIO_LOCKOUT_DURATION_SECS") {
            folio.lockout.duration = duration;
        }
        if let Some(ttl) = seconds(&lookup, "FOLIO_RESET_TOKEN_TTL_SECS") {
            folio.tokens.reset_password_ttl = ttl;
        }
        if let Some(ttl) = seconds(&lookup, "FOLIO_VERIFY_TOKEN_TTL_SECS") {
            folio.tokens.verify_email_ttl = ttl;
        }
        if let Some(concurrency) = parsed(&lookup, "FOLIO_BATCH_MAX_CONCURRENCY") {
            folio.batch.max_concurrency = concurrency;
        }
        if let Some(timeout) = seconds(&lookup, "FOLIO_BATCH_TASK_TIMEOUT_SECS") {
            folio.batch.task_timeout = timeout;
        }
        if let Some(retries) = parsed(&lookup, "FOLIO_BATCH_MAX_RETRIES") {
            folio.batch.retry.max_retries = retries;
        }

        Self {
            bind_host: lookup("FOLIO_API_BIND").unwrap_or(defaults.bind_host),
            port: parsed(&lookup, "PORT")
                .or_else(|| parsed(&lookup, "FOLIO_API_PORT"))
                .unwrap_or(defaults.port),
            ip_rate_limit_enabled: flag(&lookup, "FOLIO_IP_RATE_LIMIT_ENABLED")
                .unwrap_or(defaults.ip_rate_limit_enabled),
            ip_rate_limit_per_minute: parsed(&lookup, "FOLIO_IP_RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.ip_rate_limit_per_minute),
            ip_rate_limit_burst: parsed(&lookup, "FOLIO_IP_RATE_LIMIT_BURST")
                .unwrap_or(defaults.ip_rate_limit_burst),
            folio,
        }
    }

    /// Validate the core settings and the throttle quota.
    pub fn validate(&self) -> FolioResult<()> {
        self.folio.validate()?;
        if self.ip_rate_limit_enabled && self.ip_rate_limit_per_minute == 0 {
            return Err(folio_core::ConfigError::InvalidValue {
                field: "ip_rate_limit_per_minute".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1 when the throttle is enabled".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert!(config.ip_rate_limit_enabled);
        assert_eq!(config.ip_rate_limit_per_minute, 300);
        assert_eq!(config.folio, FolioConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("FOLIO_API_PORT", "8080"),
            ("FOLIO_IP_RATE_LIMIT_ENABLED", "false"),
            ("FOLIO_LOGIN_MAX_ATTEMPTS", "3"),
            ("FOLIO_LOCKOUT_DURATION_SECS", "60"),
            ("FOLIO_BATCH_MAX_CONCURRENCY", "8"),
            ("FOLIO_CACHE_COALESCE_MISSES", "0"),
        ]));
        assert_eq!(config.port, 8080);
        assert!(!config.ip_rate_limit_enabled);
        assert_eq!(config.folio.rate_limits.login.max_attempts, 3);
        assert_eq!(config.folio.lockout.duration, Duration::from_secs(60));
        assert_eq!(config.folio.batch.max_concurrency, 8);
        assert!(!config.folio.cache.coalesce_misses);
    }

    #[test]
    fn test_port_env_takes_precedence() {
        let config = ApiConfig::from_lookup(lookup(&[("PORT", "9000"), ("FOLIO_API_PORT", "8080")]));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("FOLIO_API_PORT", "not-a-port"),
            ("FOLIO_LOCKOUT_THRESHOLD", "-1"),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.folio.lockout.threshold, 5);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ApiConfig::from_lookup(lookup(&[("FOLIO_BATCH_MAX_CONCURRENCY", "0")]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr().unwrap().port(), 3000);

        let bad = ApiConfig {
            bind_host: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }
}
