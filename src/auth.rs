use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use uuid::Uuid;

use crate::db::queries;
use crate::error::AppError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session_token";
pub const SESSION_HEADER: &str = "x-session-token";

/// Authenticated agent, resolved from a session token. Extracting this in
/// a handler is what makes the route require login.
#[derive(Debug, Clone)]
pub struct Session {
    pub agent_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: String,
}

impl Session {
    /// Splits `full_name` into the (first name, surname) pair the payment
    /// gateway expects. Single-word names are used for both.
    pub fn customer_names(&self) -> (String, String) {
        let mut words = self.full_name.split_whitespace();
        match words.next() {
            Some(first) => {
                let rest = words.collect::<Vec<_>>().join(" ");
                if rest.is_empty() {
                    (first.to_string(), first.to_string())
                } else {
                    (first.to_string(), rest)
                }
            }
            None => (self.full_name.clone(), self.full_name.clone()),
        }
    }
}

/// Pulls the session token out of the `session_token` cookie, falling
/// back to the `x-session-token` header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    for cookie_header in headers.get_all(COOKIE) {
        let Ok(raw) = cookie_header.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name.trim() == SESSION_COOKIE && !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
    }

    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthenticated("missing session token".to_string()))?;

        let row = queries::find_session_agent(&state.db, &token)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("unknown session token".to_string()))?;

        if row.expires_at <= Utc::now() {
            return Err(AppError::Unauthenticated("session expired".to_string()));
        }

        Ok(Session {
            agent_id: row.agent_id,
            email: row.email,
            full_name: row.full_name,
            phone: row.phone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn reads_token_from_cookie() {
        let headers = headers_with("cookie", "session_token=tok-123");
        assert_eq!(extract_token(&headers), Some("tok-123".to_string()));
    }

    #[test]
    fn reads_token_among_other_cookies() {
        let headers = headers_with("cookie", "theme=dark; session_token=tok-456; lang=fr");
        assert_eq!(extract_token(&headers), Some("tok-456".to_string()));
    }

    #[test]
    fn falls_back_to_header() {
        let headers = headers_with("x-session-token", "tok-789");
        assert_eq!(extract_token(&headers), Some("tok-789".to_string()));
    }

    #[test]
    fn cookie_wins_over_header() {
        let mut headers = headers_with("cookie", "session_token=from-cookie");
        headers.insert("x-session-token", HeaderValue::from_static("from-header"));
        assert_eq!(extract_token(&headers), Some("from-cookie".to_string()));
    }

    #[test]
    fn ignores_empty_and_unrelated_values() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
        assert_eq!(
            extract_token(&headers_with("cookie", "session_token=")),
            None
        );
        assert_eq!(extract_token(&headers_with("cookie", "other=value")), None);
        assert_eq!(extract_token(&headers_with("x-session-token", "  ")), None);
    }

    #[test]
    fn splits_full_name_for_gateway() {
        let session = Session {
            agent_id: Uuid::new_v4(),
            email: "awa@example.com".to_string(),
            full_name: "Awa Diop Ndiaye".to_string(),
            phone: "+221770000000".to_string(),
        };
        assert_eq!(
            session.customer_names(),
            ("Awa".to_string(), "Diop Ndiaye".to_string())
        );

        let single = Session {
            full_name: "Awa".to_string(),
            ..session
        };
        assert_eq!(
            single.customer_names(),
            ("Awa".to_string(), "Awa".to_string())
        );
    }
}
