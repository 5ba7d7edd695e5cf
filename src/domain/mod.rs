pub mod transaction;

pub use transaction::{
    generate_transaction_ref, Transaction, TransactionStatus, DEPOSIT_CURRENCY,
    PAYMENT_METHOD_CINETPAY,
};
