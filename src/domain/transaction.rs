//! Transaction domain entity.
//! Framework-agnostic representation of a deposit payment attempt.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only payment rail currently wired up.
pub const PAYMENT_METHOD_CINETPAY: &str = "CINETPAY";

/// Deposits are denominated in West African CFA francs.
pub const DEPOSIT_CURRENCY: &str = "XOF";

/// Lifecycle of a deposit. A transaction is born `Pending` and moves to
/// exactly one terminal status; terminal rows never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Accepted,
    Refused,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Accepted => "ACCEPTED",
            TransactionStatus::Refused => "REFUSED",
            TransactionStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(TransactionStatus::Pending),
            "ACCEPTED" => Some(TransactionStatus::Accepted),
            "REFUSED" => Some(TransactionStatus::Refused),
            "EXPIRED" => Some(TransactionStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity representing a deposit transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_ref: String,
    pub agent_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub payment_token: Option<String>,
    pub operator_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a fresh `PENDING` deposit for an agent, with a newly
    /// generated reference.
    pub fn new_deposit(agent_id: Uuid, amount: BigDecimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_ref: generate_transaction_ref(agent_id, now),
            agent_id,
            amount,
            currency: DEPOSIT_CURRENCY.to_string(),
            status: TransactionStatus::Pending,
            payment_method: PAYMENT_METHOD_CINETPAY.to_string(),
            payment_token: None,
            operator_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Builds a reference of the form `txn_<agent>_<millis>_<nonce>`.
///
/// The millisecond timestamp alone is not unique under concurrency, so an
/// 8-char random nonce is appended. The database still enforces uniqueness
/// with a constraint on `transaction_ref`.
pub fn generate_transaction_ref(agent_id: Uuid, at: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "txn_{}_{}_{}",
        agent_id.simple(),
        at.timestamp_millis(),
        &nonce[..8]
    )
}
