use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::config::Config;
use crate::error::AppError;

/// Guards operator-only routes with the static admin API key. Accepts the
/// key bare or as a Bearer token.
pub async fn admin_auth(
    State(config): State<Config>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(auth)
            if auth == format!("Bearer {}", config.admin_api_key)
                || auth == config.admin_api_key =>
        {
            Ok(next.run(req).await)
        }
        _ => Err(AppError::Unauthenticated(
            "invalid admin credentials".to_string(),
        )),
    }
}
