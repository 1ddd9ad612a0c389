//! Request throttling and response hardening.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::debug;

use super::handlers::ApiError;

/// Token-bucket quota: `per_second` sustained, bursting to `burst`.
fn quota(per_second: u32, burst: u32) -> Quota {
    let nz = |n| NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN);
    Quota::per_second(nz(per_second)).allow_burst(nz(burst))
}

pub struct RateLimits {
    global: DefaultDirectRateLimiter,
    per_ip: DefaultKeyedRateLimiter<IpAddr>,
    api: DefaultDirectRateLimiter,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new(quota(30, 50), quota(1, 60), quota(10, 20))
    }
}

impl RateLimits {
    pub fn new(global: Quota, per_ip: Quota, api: Quota) -> Self {
        Self {
            global: RateLimiter::direct(global),
            per_ip: RateLimiter::keyed(per_ip),
            api: RateLimiter::direct(api),
        }
    }

    /// Drop per-client buckets that have fully refilled.
    pub fn prune(&self) {
        self.per_ip.retain_recent();
        self.per_ip.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.per_ip.len()
    }
}

fn too_many(msg: &str) -> Response {
    ApiError(StatusCode::TOO_MANY_REQUESTS, msg.to_string()).into_response()
}

/// Client address: the socket peer, else the first `X-Forwarded-For` hop.
fn client_ip(req: &Request<Body>) -> IpAddr {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn global_limit(
    State(limits): State<Arc<RateLimits>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limits.global.check().is_err() {
        debug!("Global rate limit hit: {}", req.uri().path());
        return too_many("系統繁忙，請稍後再試");
    }
    let ip = client_ip(&req);
    if limits.per_ip.check_key(&ip).is_err() {
        debug!("Per-client rate limit hit for {}", ip);
        return too_many("請求過於頻繁，請稍後再試");
    }
    next.run(req).await
}

pub async fn api_limit(
    State(limits): State<Arc<RateLimits>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limits.api.check().is_err() {
        return too_many("請求過於頻繁，請稍後再試");
    }
    next.run(req).await
}

pub fn security_headers() -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    let headers: [(HeaderName, &'static str); 6] = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::X_XSS_PROTECTION, "1; mode=block"),
        (header::STRICT_TRANSPORT_SECURITY, "max-age=31536000; includeSubDomains"),
        (header::CONTENT_SECURITY_POLICY, "default-src 'self'"),
        (header::SERVER, "What2Eat-API"),
    ];
    headers
        .into_iter()
        .map(|(name, value)| SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_refuse() {
        let limits = RateLimits::new(quota(1, 3), quota(1, 100), quota(1, 100));
        for _ in 0..3 {
            assert!(limits.global.check().is_ok());
        }
        assert!(limits.global.check().is_err());
    }

    #[test]
    fn test_per_ip_buckets_are_independent() {
        let limits = RateLimits::new(quota(100, 100), quota(1, 2), quota(100, 100));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limits.per_ip.check_key(&a).is_ok());
        assert!(limits.per_ip.check_key(&a).is_ok());
        assert!(limits.per_ip.check_key(&a).is_err());
        assert!(limits.per_ip.check_key(&b).is_ok());
        assert_eq!(limits.tracked_clients(), 2);
    }

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "203.0.113.7".parse::<IpAddr>().unwrap());

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
