use serde::Deserialize;
use sqlx::types::BigDecimal;
use std::fmt;

pub const TRANSACTION_REF_MAX_LEN: usize = 64;
pub const TRANSACTION_REF_PREFIX: &str = "txn_";
pub const CURRENCY_MAX_LEN: usize = 3;
pub const OPERATOR_ID_MAX_LEN: usize = 255;
pub const STATUS_MAX_LEN: usize = 20;
pub const ALLOWED_CURRENCIES: &[&str] = &["XOF"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrictPayload<T> {
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

/// References are generated internally; anything else presented on the wire
/// must still look like one before it reaches a query.
pub fn validate_transaction_ref(transaction_ref: &str) -> ValidationResult {
    let transaction_ref = sanitize_string(transaction_ref);
    validate_required("transaction_id", &transaction_ref)?;
    validate_max_len("transaction_id", &transaction_ref, TRANSACTION_REF_MAX_LEN)?;

    if !transaction_ref.starts_with(TRANSACTION_REF_PREFIX) {
        return Err(ValidationError::new(
            "transaction_id",
            format!("must start with '{}'", TRANSACTION_REF_PREFIX),
        ));
    }

    if !transaction_ref
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
    {
        return Err(ValidationError::new(
            "transaction_id",
            "must contain only lowercase letters, digits and underscores",
        ));
    }

    Ok(())
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    let currency = sanitize_string(currency);
    validate_required("currency", &currency)?;
    validate_max_len("currency", &currency, CURRENCY_MAX_LEN)?;
    validate_enum("currency", &currency, ALLOWED_CURRENCIES)?;

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn validates_enum_values() {
        assert!(validate_enum("status", "PENDING", &["PENDING", "ACCEPTED"]).is_ok());
        assert!(validate_enum("status", "UNKNOWN", &["PENDING", "ACCEPTED"]).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn validates_transaction_ref() {
        assert!(validate_transaction_ref("txn_a1b2c3_1700000000000_deadbeef").is_ok());
        assert!(validate_transaction_ref("  txn_a1_1_ff  ").is_ok());
        assert!(validate_transaction_ref("ref_a1_1_ff").is_err());
        assert!(validate_transaction_ref("txn_A1_1_FF").is_err());
        assert!(validate_transaction_ref("txn_a1;DROP TABLE").is_err());
        assert!(validate_transaction_ref("").is_err());
        assert!(validate_transaction_ref(&format!("txn_{}", "a".repeat(70))).is_err());
    }

    #[test]
    fn validates_currency() {
        assert!(validate_currency("XOF").is_ok());
        assert!(validate_currency("  XOF  ").is_ok());
        assert!(validate_currency("xof").is_err());
        assert!(validate_currency("EUR").is_err());
        assert!(validate_currency("").is_err());
    }

    #[test]
    fn validates_positive_amount() {
        let positive = BigDecimal::from_str("5000").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);

        assert!(validate_positive_amount(&positive).is_ok());
        assert!(validate_positive_amount(&zero).is_err());
        assert!(validate_positive_amount(&negative).is_err());
    }

    #[test]
    fn strict_payload_accepts_known_fields() {
        #[derive(Debug, Deserialize, PartialEq, Eq)]
        struct Payload {
            transaction_id: String,
            status: String,
        }

        let parsed: StrictPayload<Payload> =
            serde_json::from_str(r#"{"transaction_id":"txn_1","status":"ACCEPTED"}"#)
                .expect("valid payload");

        assert_eq!(
            parsed.data,
            Payload {
                transaction_id: "txn_1".to_string(),
                status: "ACCEPTED".to_string()
            }
        );
    }

    #[test]
    fn strict_payload_rejects_unknown_fields() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            transaction_id: String,
        }

        let parsed =
            serde_json::from_str::<StrictPayload<Payload>>(r#"{"transaction_id":"txn_1","x":"y"}"#);
        assert!(parsed.is_err());
    }
}
