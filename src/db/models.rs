use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};

/// Persisted shape of a deposit transaction. Status travels as text; the
/// migration constrains it to the four known values.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct TransactionRow {
    pub id: Uuid,
    pub transaction_ref: String,
    pub agent_id: Uuid,
    #[schema(value_type = String, example = "5000")]
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub payment_token: Option<String>,
    pub operator_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn status_parsed(&self) -> Option<TransactionStatus> {
        TransactionStatus::parse(&self.status)
    }
}

impl From<&Transaction> for TransactionRow {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            transaction_ref: tx.transaction_ref.clone(),
            agent_id: tx.agent_id,
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            status: tx.status.as_str().to_string(),
            payment_method: tx.payment_method.clone(),
            payment_token: tx.payment_token.clone(),
            operator_id: tx.operator_id.clone(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Join of a session token with its owning agent, used during
/// authentication.
#[derive(Debug, Clone, FromRow)]
pub struct SessionAgentRow {
    pub agent_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub expires_at: DateTime<Utc>,
}
