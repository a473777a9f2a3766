//! Constants for FOLIO API
//!
//! This module contains all constant values used throughout the API.

// ============================================================================
// RESPONSE WORDING
// ============================================================================

/// Returned for every unknown, consumed or tampered token.
pub const GENERIC_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Returned for a genuine token presented after its lifetime.
pub const EXPIRED_TOKEN_MESSAGE: &str = "This link has expired. Please request a new one.";

/// Returned for every rate-limit denial and account lock.
pub const GENERIC_THROTTLE_MESSAGE: &str = "Too many attempts. Please try again later.";

/// Acknowledgement for registration and reset requests, whether or not the
/// address is known.
pub const GENERIC_ACCEPTED_MESSAGE: &str =
    "If the address can receive mail, a message has been sent.";

// ============================================================================
// SECURITY TOKENS
// ============================================================================

/// Random bytes per issued token (256 bits).
pub const TOKEN_SECRET_BYTES: usize = 32;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Prefix of rate-limit counter keys in the key-value store.
pub const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit";

/// Prefix of lockout records kept for addresses without an account.
pub const LOCKOUT_KEY_PREFIX: &str = "lockout";

/// How long failed logins against an unknown address are remembered.
pub const UNKNOWN_LOCKOUT_RETENTION_SECS: u64 = 30 * 24 * 60 * 60;

/// Default per-IP request quota (per minute).
pub const DEFAULT_IP_RATE_LIMIT_PER_MINUTE: u32 = 300;

/// Default per-IP burst size.
pub const DEFAULT_IP_RATE_LIMIT_BURST: u32 = 30;

// ============================================================================
// SERVER
// ============================================================================

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted request body (bytes).
pub const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

// ============================================================================
// VALIDATION
// ============================================================================

/// Longest accepted email address.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Default page size for literature search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

// ============================================================================
// MAINTENANCE
// ============================================================================

/// How often expired tokens and key-value entries are purged.
pub const EXPIRY_PURGE_INTERVAL_SECS: u64 = 3600;
