use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Create a keyed rate limiter allowing `attempts` per `window_seconds` per IP.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis((window_seconds.max(1) * 1000) / attempts.get() as u64);
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(attempts))
        .allow_burst(attempts);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Resolve the client IP from the peer address of the connection.
///
/// `x-forwarded-for` is client-controlled and never consulted.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request) {
        Some(ip) => match limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(ip = %ip, "Rate limit exceeded");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body, http::Request as HttpRequest, http::StatusCode, middleware::from_fn_with_state,
        routing::post, Router,
    };
    use tower::ServiceExt;

    fn request(ip: [u8; 4], forwarded_for: &str) -> HttpRequest<Body> {
        let mut req = HttpRequest::builder()
            .method("POST")
            .uri("/limited")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        req
    }

    fn app(attempts: u32) -> Router {
        let limiter = create_ip_rate_limiter(attempts, 3600);
        Router::new()
            .route("/limited", post(|| async { "ok" }))
            .layer(from_fn_with_state(limiter, ip_rate_limit_middleware))
    }

    #[tokio::test]
    async fn test_ip_limiter_rejects_after_burst() {
        let app = app(2);

        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(request([203, 0, 113, 7], "198.51.100.1"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app
            .oneshot(request([203, 0, 113, 7], "198.51.100.1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_forwarded_for_does_not_change_the_key() {
        let app = app(1);

        let first = app
            .clone()
            .oneshot(request([203, 0, 113, 8], "198.51.100.1"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let rotated = app
            .clone()
            .oneshot(request([203, 0, 113, 8], "198.51.100.2"))
            .await
            .unwrap();
        assert_eq!(rotated.status(), StatusCode::TOO_MANY_REQUESTS);

        let other_peer = app
            .oneshot(request([203, 0, 113, 9], "198.51.100.1"))
            .await
            .unwrap();
        assert_eq!(other_peer.status(), StatusCode::OK);
    }
}
