use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

pub type InitiationRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub fn build_rate_limiter(per_minute: u32) -> Arc<InitiationRateLimiter> {
    let cells = NonZeroU32::new(per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(cells)))
}

/// Per-source throttle on payment initiation. Keys on the forwarded
/// client address when present, the socket peer otherwise.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<InitiationRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);

    if limiter.check_key(&key).is_err() {
        tracing::warn!(client = %key, "payment initiation rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "too many payment attempts, slow down",
                "code": "RATE_LIMITED",
                "status": 429,
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn app(per_minute: u32) -> Router {
        Router::new()
            .route("/payments/initialize", post(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                build_rate_limiter(per_minute),
                rate_limit_middleware,
            ))
    }

    fn request_from(ip: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/payments/initialize")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let app = app(5);
        for _ in 0..5 {
            let response = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn throttles_a_source_over_the_limit() {
        let app = app(2);

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn sources_are_throttled_independently() {
        let app = app(1);

        let first = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let throttled = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = app.clone().oneshot(request_from("198.51.100.4")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }
}
