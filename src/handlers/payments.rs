use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::Deserialize;
use sqlx::types::BigDecimal;
use utoipa::ToSchema;

use crate::AppState;
use crate::auth::Session;
use crate::db::models::TransactionRow;
use crate::db::queries;
use crate::error::AppError;
use crate::services::DepositInitiated;
use crate::validation::{StrictPayload, ValidationError};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitializeDepositRequest {
    /// Deposit amount in XOF. Accepts a JSON number or numeric string.
    #[schema(value_type = Option<f64>, example = 5000)]
    pub amount: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/payments/initialize",
    request_body = InitializeDepositRequest,
    responses(
        (status = 200, description = "Deposit recorded and payment link issued", body = DepositInitiated),
        (status = 400, description = "Missing, non-positive or malformed amount"),
        (status = 401, description = "Missing or expired session"),
        (status = 429, description = "Rate limited or duplicate request in flight"),
        (status = 500, description = "Ledger write or gateway failure")
    ),
    tag = "Payments"
)]
pub async fn initialize_deposit(
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<StrictPayload<InitializeDepositRequest>>, JsonRejection>,
) -> Result<Json<DepositInitiated>, AppError> {
    let Json(payload) = payload
        .map_err(|rejection| ValidationError::new("body", rejection.body_text()))?;

    let initiated = state.initiator.initiate(&session, payload.data.amount).await?;

    Ok(Json(initiated))
}

#[utoipa::path(
    get,
    path = "/payments/{transaction_ref}",
    params(
        ("transaction_ref" = String, Path, description = "Local transaction reference")
    ),
    responses(
        (status = 200, description = "Transaction found", body = TransactionRow),
        (status = 401, description = "Missing or expired session"),
        (status = 404, description = "No such transaction for this agent")
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    session: Session,
    Path(transaction_ref): Path<String>,
) -> Result<Json<TransactionRow>, AppError> {
    // Scoped to the caller: someone else's ref is indistinguishable from
    // a missing one.
    let row = queries::get_owned_transaction_by_ref(&state.db, &transaction_ref, session.agent_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {} not found", transaction_ref)))?;

    Ok(Json(row))
}

#[utoipa::path(
    get,
    path = "/payments",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, 1-100, default 20"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, default 0")
    ),
    responses(
        (status = 200, description = "The caller's transactions, newest first", body = [TransactionRow]),
        (status = 401, description = "Missing or expired session")
    ),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    session: Session,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<TransactionRow>>, AppError> {
    let limit = pagination
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = pagination.offset.unwrap_or(0).max(0);

    let rows = queries::list_transactions_for_agent(&state.db, session.agent_id, limit, offset).await?;

    Ok(Json(rows))
}
