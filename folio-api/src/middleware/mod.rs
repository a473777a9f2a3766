//! Axum middleware for the FOLIO API.
//!
//! Order on the router, outermost first: tracing, observability, per-IP
//! throttle, then the routes. Per-action limits (login, reset, ...) are
//! enforced inside the services, not here.

pub mod rate_limit;

pub use rate_limit::{ip_rate_limit_middleware, IpRateLimitState};
