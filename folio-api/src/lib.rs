//! FOLIO API - services and REST surface
//!
//! Account security (single-use tokens, action rate limits, lockout),
//! document version history and batched section generation, exposed over
//! an Axum router. Storage and external providers are injected through the
//! traits in `folio-storage` and `folio-llm`.

mod macros;

pub mod config;
pub mod constants;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use services::{
    AccountService, BatchOptions, BatchOrchestrator, LockoutPolicy, RateLimitDecision,
    RateLimiter, TokenService,
};
pub use state::{AppState, AppStateBuilder};
