//! Client address extraction.
//!
//! Proxy headers win over the socket address: `X-Forwarded-For` (first
//! entry), then `X-Real-IP`, then the connection peer. When none is known,
//! the unspecified address is used so every anonymous caller shares one
//! bucket.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

/// Best-effort client IP of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIp(pub IpAddr);

impl ClientIp {
    /// Text form used as a rate-limit identifier.
    pub fn as_identifier(&self) -> String {
        self.0.to_string()
    }
}

fn from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok());
    if forwarded.is_some() {
        return forwarded;
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Resolve the client IP from request parts.
pub fn client_ip_from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    from_headers(headers)
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip_from_parts(&parts.headers, peer)))
    }
}
