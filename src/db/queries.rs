use crate::db::models::{SessionAgentRow, TransactionRow};
use crate::domain::{Transaction, TransactionStatus};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

// --- Transaction queries ---

pub async fn insert_transaction(pool: &PgPool, tx: &Transaction) -> Result<TransactionRow> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, transaction_ref, agent_id, amount, currency, status,
            payment_method, payment_token, operator_id, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(&tx.transaction_ref)
    .bind(tx.agent_id)
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(tx.status.as_str())
    .bind(&tx.payment_method)
    .bind(&tx.payment_token)
    .bind(&tx.operator_id)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_transaction_by_ref(
    pool: &PgPool,
    transaction_ref: &str,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE transaction_ref = $1")
        .bind(transaction_ref)
        .fetch_optional(pool)
        .await
}

/// Scoped lookup: a ref belonging to another agent is indistinguishable
/// from one that does not exist.
pub async fn get_owned_transaction_by_ref(
    pool: &PgPool,
    transaction_ref: &str,
    agent_id: Uuid,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE transaction_ref = $1 AND agent_id = $2",
    )
    .bind(transaction_ref)
    .bind(agent_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_transactions_for_agent(
    pool: &PgPool,
    agent_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE agent_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(agent_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn set_payment_token(pool: &PgPool, id: Uuid, payment_token: &str) -> Result<()> {
    sqlx::query(
        "UPDATE transactions SET payment_token = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(payment_token)
    .execute(pool)
    .await?;

    Ok(())
}

/// Moves a transaction out of `PENDING`, guarded so a terminal row is
/// never rewritten. Returns `None` when no `PENDING` row matched, which
/// covers both "unknown ref" and "already terminal".
pub async fn apply_status_transition(
    pool: &PgPool,
    transaction_ref: &str,
    next: TransactionStatus,
    operator_id: Option<&str>,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET status = $2, operator_id = COALESCE($3, operator_id), updated_at = NOW()
        WHERE transaction_ref = $1 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(transaction_ref)
    .bind(next.as_str())
    .bind(operator_id)
    .fetch_optional(pool)
    .await
}

/// Locks a batch of aged `PENDING` rows for the sweeper. `SKIP LOCKED`
/// keeps concurrent sweep passes from fighting over the same rows.
pub async fn get_stale_pending(
    executor: &mut SqlxTransaction<'_, Postgres>,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE status = 'PENDING'
        AND created_at <= $1
        ORDER BY created_at ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(&mut **executor)
    .await
}

/// In-lock variant of the status transition, used by the sweeper on rows
/// it already holds.
pub async fn mark_status(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    next: TransactionStatus,
    operator_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE transactions
        SET status = $2, operator_id = COALESCE($3, operator_id), updated_at = NOW()
        WHERE id = $1 AND status = 'PENDING'
        "#,
    )
    .bind(id)
    .bind(next.as_str())
    .bind(operator_id)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

/// Filtered page for the export stream. NULL filter arguments are
/// no-ops, so one prepared statement covers every combination. The
/// upper time bound is exclusive.
pub async fn export_page(
    pool: &PgPool,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
        AND ($2::timestamptz IS NULL OR created_at < $2)
        AND ($3::text IS NULL OR status = $3)
        ORDER BY created_at ASC, id ASC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

// --- Session queries ---

pub async fn find_session_agent(pool: &PgPool, token: &str) -> Result<Option<SessionAgentRow>> {
    sqlx::query_as::<_, SessionAgentRow>(
        r#"
        SELECT a.id AS agent_id, a.email, a.full_name, a.phone, s.expires_at
        FROM sessions s
        JOIN agents a ON a.id = s.agent_id
        WHERE s.token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}
