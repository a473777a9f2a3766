//! Domain services behind the HTTP surface.

pub mod account_service;
pub mod batch;
pub mod credentials;
pub mod lockout;
pub mod mailer;
pub mod rate_limiter;
pub mod token_service;

pub use account_service::{AccountService, AccountStores, AuthenticatedSubject};
pub use batch::{first_failure, BatchOptions, BatchOrchestrator};
pub use credentials::{Argon2CredentialHasher, Argon2Policy, CredentialHasher};
pub use lockout::LockoutPolicy;
pub use mailer::{Mailer, OutboxMailer, TokenMessage};
pub use rate_limiter::{counter_key, RateLimitDecision, RateLimiter};
pub use token_service::{IssuedToken, TokenService};
