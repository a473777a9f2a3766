//! Coarse per-IP request throttle.
//!
//! An in-process token bucket per client address, ahead of every route. It
//! bounds request volume only; account-level limits live in
//! `services::rate_limiter`.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::extractors::client_ip_from_parts;
use crate::telemetry::metrics;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct IpRateLimitState {
    enabled: bool,
    per_minute: u32,
    burst: u32,
    limiters: Arc<DashMap<IpAddr, Arc<DirectRateLimiter>>>,
}

impl std::fmt::Debug for IpRateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpRateLimitState")
            .field("enabled", &self.enabled)
            .field("per_minute", &self.per_minute)
            .field("burst", &self.burst)
            .field("tracked_clients", &self.limiters.len())
            .finish()
    }
}

impl IpRateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            enabled: config.ip_rate_limit_enabled,
            per_minute: config.ip_rate_limit_per_minute,
            burst: config.ip_rate_limit_burst,
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<DirectRateLimiter> {
        self.limiters
            .entry(ip)
            .or_insert_with(|| {
                let quota =
                    Quota::per_minute(NonZeroU32::new(self.per_minute).unwrap_or(NonZeroU32::MIN))
                        .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN));
                Arc::new(RateLimiter::direct(quota))
            })
            .clone()
    }
}

/// Reject requests over the per-IP quota with 429 and `Retry-After`.
pub async fn ip_rate_limit_middleware(
    State(state): State<IpRateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let ip = client_ip_from_parts(request.headers(), peer);
    let limiter = state.limiter_for(ip);

    match limiter.check() {
        Ok(_) => {
            if let Some(metrics) = metrics() {
                metrics.record_rate_limit("ip", true);
            }
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&state.per_minute.to_string()) {
                response.headers_mut().insert("x-ratelimit-limit", value);
            }
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            if let Some(metrics) = metrics() {
                metrics.record_rate_limit("ip", false);
            }
            tracing::debug!(retry_after, "Per-IP request quota exceeded");
            Err(ApiError::too_many_requests(retry_after))
        }
    }
}
