use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::AppState;
use crate::db::queries;
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::validation::{self, ValidationError};

/// Header carrying the hex HMAC-SHA256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-token";

type HmacSha256 = Hmac<Sha256>;

/// Checks the claimed signature against the raw body. Runs before the
/// body is parsed, so unauthenticated payloads never reach serde.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> Result<(), AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Configuration("webhook secret is unusable".to_string()))?;
    mac.update(body);

    let claimed = hex::decode(signature_hex.trim()).map_err(|_| AppError::InvalidSignature)?;

    // verify_slice compares in constant time.
    mac.verify_slice(&claimed)
        .map_err(|_| AppError::InvalidSignature)
}

/// Gateway notification body. Extra fields are tolerated; only the
/// reference and the status drive the transition.
#[derive(Debug, Deserialize, Serialize)]
pub struct NotificationPayload {
    pub transaction_id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<bigdecimal::BigDecimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub operator_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationAck {
    pub transaction_id: String,
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/payments/notify",
    responses(
        (status = 200, description = "Status applied, or same status re-delivered", body = NotificationAck),
        (status = 400, description = "Unparseable payload or non-terminal status"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Unknown transaction reference"),
        (status = 409, description = "Transaction already settled differently")
    ),
    tag = "Payments"
)]
pub async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<NotificationAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    // The credential store holds the live secret, so a Vault rotation
    // applies to signature checks as well as outbound calls.
    let credentials = state.credentials.current();
    if credentials.secret_key.is_empty() {
        return Err(AppError::Configuration(
            "webhook secret is not configured".to_string(),
        ));
    }

    verify_signature(&credentials.secret_key, &body, signature)?;

    let payload: NotificationPayload = serde_json::from_slice(&body)
        .map_err(|err| ValidationError::new("body", err.to_string()))?;

    validation::validate_transaction_ref(&payload.transaction_id)?;

    let next = TransactionStatus::parse(&payload.status)
        .filter(|status| status.is_terminal())
        .ok_or_else(|| {
            ValidationError::new(
                "status",
                format!(
                    "expected ACCEPTED, REFUSED or EXPIRED, got {}",
                    payload.status
                ),
            )
        })?;

    let updated = queries::apply_status_transition(
        &state.db,
        &payload.transaction_id,
        next,
        payload.operator_id.as_deref(),
    )
    .await?;

    match updated {
        Some(row) => {
            info!(
                transaction_ref = %row.transaction_ref,
                status = %next,
                "payment notification applied"
            );
            Ok(Json(NotificationAck {
                transaction_id: row.transaction_ref,
                status: next.as_str().to_string(),
            }))
        }
        None => {
            // No PENDING row matched: the ref is unknown, or the row is
            // already terminal. Re-read to tell those apart.
            let row = queries::get_transaction_by_ref(&state.db, &payload.transaction_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "transaction {} not found",
                        payload.transaction_id
                    ))
                })?;

            if row.status == next.as_str() {
                info!(
                    transaction_ref = %row.transaction_ref,
                    status = %row.status,
                    "duplicate notification acknowledged"
                );
                Ok(Json(NotificationAck {
                    transaction_id: row.transaction_ref,
                    status: row.status,
                }))
            } else {
                warn!(
                    transaction_ref = %row.transaction_ref,
                    current = %row.status,
                    requested = %next,
                    "conflicting notification rejected"
                );
                Err(AppError::Conflict(format!(
                    "transaction already {}",
                    row.status
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"transaction_id":"txn_1","status":"ACCEPTED"}"#;
        let signature = sign("secret", body);

        assert!(verify_signature("secret", body, &signature).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let body = br#"{"transaction_id":"txn_1","status":"ACCEPTED"}"#;
        let tampered = br#"{"transaction_id":"txn_1","status":"REFUSED"}"#;
        let signature = sign("secret", body);

        let result = verify_signature("secret", tampered, &signature);
        assert!(matches!(result, Err(AppError::InvalidSignature)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = br#"{"transaction_id":"txn_1","status":"ACCEPTED"}"#;
        let signature = sign("secret", body);

        let result = verify_signature("other-secret", body, &signature);
        assert!(matches!(result, Err(AppError::InvalidSignature)));
    }

    #[test]
    fn rejects_non_hex_signature() {
        let body = br#"{}"#;

        let result = verify_signature("secret", body, "not hex at all");
        assert!(matches!(result, Err(AppError::InvalidSignature)));
    }

    #[test]
    fn payload_tolerates_extra_fields() {
        let raw = r#"{
            "transaction_id": "txn_abc_1_deadbeef",
            "status": "ACCEPTED",
            "operator_id": "OP-42",
            "cpm_site_id": "105899471",
            "signature": "ignored"
        }"#;

        let payload: NotificationPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.transaction_id, "txn_abc_1_deadbeef");
        assert_eq!(payload.operator_id.as_deref(), Some("OP-42"));
        assert!(payload.amount.is_none());
    }

    #[test]
    fn only_terminal_statuses_apply() {
        for raw in ["PENDING", "WAITING_FOR_CUSTOMER", "nonsense"] {
            let parsed = TransactionStatus::parse(raw).filter(|status| status.is_terminal());
            assert!(parsed.is_none(), "{raw} must not be applicable");
        }

        for raw in ["ACCEPTED", "REFUSED", "EXPIRED"] {
            let parsed = TransactionStatus::parse(raw).filter(|status| status.is_terminal());
            assert!(parsed.is_some(), "{raw} must be applicable");
        }
    }
}
