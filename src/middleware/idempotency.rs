use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

const IDEMPOTENCY_TTL: u64 = 86400; // 24 hours in seconds
const PROCESSING_LOCK_TTL: u64 = 300; // 5 minutes in seconds
const IDEMPOTENCY_PREFIX: &str = "idempotency:";
const MAX_CACHED_BODY_BYTES: usize = 256 * 1024;

#[derive(Clone)]
pub struct IdempotencyService {
    redis_client: redis::Client,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug)]
pub enum IdempotencyStatus {
    New,
    Processing,
    Completed(CachedResponse),
}

impl IdempotencyService {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    /// Checks whether a request with this key is in flight or already
    /// answered. A fresh key takes a short-lived PROCESSING lock.
    pub async fn check_idempotency(&self, idempotency_key: &str) -> anyhow::Result<IdempotencyStatus> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", IDEMPOTENCY_PREFIX, idempotency_key);

        let existing: Option<String> = conn.get(&key).await?;

        match existing {
            Some(value) => {
                if value == "PROCESSING" {
                    Ok(IdempotencyStatus::Processing)
                } else {
                    let cached: CachedResponse = serde_json::from_str(&value)?;
                    Ok(IdempotencyStatus::Completed(cached))
                }
            }
            None => {
                let _: () = conn.set_ex(&key, "PROCESSING", PROCESSING_LOCK_TTL).await?;
                Ok(IdempotencyStatus::New)
            }
        }
    }

    /// Stores the answered response so duplicates replay it verbatim.
    pub async fn store_response(
        &self,
        idempotency_key: &str,
        status: u16,
        body: String,
    ) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", IDEMPOTENCY_PREFIX, idempotency_key);

        let cached = CachedResponse { status, body };
        let serialized = serde_json::to_string(&cached)?;

        let _: () = conn.set_ex(&key, serialized, IDEMPOTENCY_TTL).await?;
        Ok(())
    }

    /// Releases the processing lock after a failed attempt, so the caller
    /// may retry with the same key.
    pub async fn release_lock(&self, idempotency_key: &str) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", IDEMPOTENCY_PREFIX, idempotency_key);
        let _: () = conn.del(&key).await?;
        Ok(())
    }
}

/// Deduplicates payment initiation requests keyed on `x-idempotency-key`.
/// Requests without the header pass straight through; Redis being down
/// fails open so payments keep working.
pub async fn idempotency_middleware(
    State(service): State<Option<IdempotencyService>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(service) = service else {
        return next.run(request).await;
    };

    let idempotency_key = match request.headers().get("x-idempotency-key") {
        Some(key) => match key.to_str() {
            Ok(k) => k.to_string(),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid idempotency key format",
                        "code": "VALIDATION",
                        "status": 400,
                    })),
                )
                    .into_response();
            }
        },
        None => {
            return next.run(request).await;
        }
    };

    match service.check_idempotency(&idempotency_key).await {
        Ok(IdempotencyStatus::New) => {
            let response = next.run(request).await;

            if response.status().is_success() {
                cache_and_rebuild(&service, &idempotency_key, response).await
            } else {
                if let Err(error) = service.release_lock(&idempotency_key).await {
                    tracing::error!(%error, "failed to release idempotency lock");
                }
                response
            }
        }
        Ok(IdempotencyStatus::Processing) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Request with this idempotency key is being processed",
                "retry_after": 5,
            })),
        )
            .into_response(),
        Ok(IdempotencyStatus::Completed(cached)) => {
            let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
            let mut response = (status, cached.body).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json"),
            );
            response.headers_mut().insert(
                "x-idempotent-replay",
                header::HeaderValue::from_static("true"),
            );
            response
        }
        Err(error) => {
            tracing::error!(%error, "idempotency check failed, proceeding without it");
            next.run(request).await
        }
    }
}

/// Buffers the successful response body into the cache, then hands the
/// same body back to the caller.
async fn cache_and_rebuild(
    service: &IdempotencyService,
    idempotency_key: &str,
    response: Response,
) -> Response {
    let status = response.status();
    let (parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(%error, "failed to buffer response for idempotency cache");
            if let Err(error) = service.release_lock(idempotency_key).await {
                tracing::error!(%error, "failed to release idempotency lock");
            }
            return Response::from_parts(parts, Body::empty());
        }
    };

    let body_text = String::from_utf8_lossy(&bytes).to_string();
    if let Err(error) = service
        .store_response(idempotency_key, status.as_u16(), body_text)
        .await
    {
        tracing::error!(%error, "failed to store idempotency response");
    }

    Response::from_parts(parts, Body::from(bytes))
}
