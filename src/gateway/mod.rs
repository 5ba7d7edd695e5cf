pub mod client;
pub mod credentials;

pub use client::{
    CinetPayClient, GatewayError, GatewayPaymentStatus, InitializePaymentRequest, PaymentCheck,
    PaymentInitiated,
};
pub use credentials::{CredentialStore, GatewayCredentials};
