use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::gateway::credentials::CredentialStore;

/// Wire code CinetPay returns when a payment link was created.
const CODE_PAYMENT_CREATED: &str = "201";

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway declined the request: {code} {message}")]
    Declined { code: String, message: String },
    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("gateway circuit breaker is open")]
    CircuitOpen,
}

impl GatewayError {
    /// Only transport-level failures are worth retrying; a decline or a
    /// malformed body will not improve on a second attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Request(error) => error.is_timeout() || error.is_connect(),
            _ => false,
        }
    }
}

/// Fields forwarded to `POST /v2/payment`, minus the credentials which
/// the client injects from its store.
#[derive(Debug, Clone)]
pub struct InitializePaymentRequest {
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub description: String,
    pub customer_name: String,
    pub customer_surname: String,
    pub customer_email: String,
    pub customer_phone_number: String,
    pub notify_url: String,
    pub return_url: String,
    pub channels: String,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    apikey: &'a str,
    site_id: &'a str,
    transaction_id: &'a str,
    amount: &'a BigDecimal,
    currency: &'a str,
    description: &'a str,
    customer_name: &'a str,
    customer_surname: &'a str,
    customer_email: &'a str,
    customer_phone_number: &'a str,
    notify_url: &'a str,
    return_url: &'a str,
    channels: &'a str,
}

#[derive(Debug, Serialize)]
struct CheckBody<'a> {
    apikey: &'a str,
    site_id: &'a str,
    transaction_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct InitializeResponse {
    code: String,
    message: String,
    #[serde(default)]
    data: Option<InitializeData>,
    #[serde(default)]
    api_response_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InitializeData {
    payment_token: String,
    payment_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckResponse {
    code: String,
    message: String,
    #[serde(default)]
    data: Option<CheckData>,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckData {
    status: String,
    #[serde(default)]
    operator_id: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
}

/// Successful outcome of a payment initialization.
#[derive(Debug, Clone)]
pub struct PaymentInitiated {
    pub payment_token: String,
    pub payment_url: String,
    pub api_response_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Accepted,
    Refused,
    Pending,
}

impl GatewayPaymentStatus {
    /// CinetPay reports several waiting states; anything that is not a
    /// definitive accept or refuse counts as still pending.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "ACCEPTED" | "SUCCES" => GatewayPaymentStatus::Accepted,
            "REFUSED" | "PAYMENT_FAILED" => GatewayPaymentStatus::Refused,
            _ => GatewayPaymentStatus::Pending,
        }
    }
}

/// Result of a `POST /v2/payment/check` poll.
#[derive(Debug, Clone)]
pub struct PaymentCheck {
    pub status: GatewayPaymentStatus,
    pub operator_id: Option<String>,
    pub payment_method: Option<String>,
}

/// HTTP client for the CinetPay checkout API.
#[derive(Clone)]
pub struct CinetPayClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl CinetPayClient {
    /// Creates a new client with the default circuit breaker (opens after
    /// 3 consecutive failures, recovers after 60-120s).
    pub fn new(base_url: String, credentials: Arc<CredentialStore>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        CinetPayClient {
            client,
            base_url,
            credentials,
            circuit_breaker,
        }
    }

    /// Creates a new client with custom circuit breaker configuration.
    pub fn with_circuit_breaker(
        base_url: String,
        credentials: Arc<CredentialStore>,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        CinetPayClient {
            client,
            base_url,
            credentials,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// Asks CinetPay to create a payment link for an already-recorded
    /// transaction.
    pub async fn initialize_payment(
        &self,
        request: &InitializePaymentRequest,
    ) -> Result<PaymentInitiated, GatewayError> {
        let creds = self.credentials.current();
        let body = InitializeBody {
            apikey: &creds.api_key,
            site_id: &creds.site_id,
            transaction_id: &request.transaction_id,
            amount: &request.amount,
            currency: &request.currency,
            description: &request.description,
            customer_name: &request.customer_name,
            customer_surname: &request.customer_surname,
            customer_email: &request.customer_email,
            customer_phone_number: &request.customer_phone_number,
            notify_url: &request.notify_url,
            return_url: &request.return_url,
            channels: &request.channels,
        };

        let response: InitializeResponse = self.post_json("/v2/payment", &body).await?;

        if response.code != CODE_PAYMENT_CREATED {
            return Err(GatewayError::Declined {
                code: response.code,
                message: response.message,
            });
        }

        let data = response.data.ok_or_else(|| {
            GatewayError::InvalidResponse("success response carried no data".to_string())
        })?;

        Ok(PaymentInitiated {
            payment_token: data.payment_token,
            payment_url: data.payment_url,
            api_response_id: response.api_response_id,
        })
    }

    /// Polls CinetPay for the current state of a transaction.
    pub async fn check_payment(&self, transaction_ref: &str) -> Result<PaymentCheck, GatewayError> {
        let creds = self.credentials.current();
        let body = CheckBody {
            apikey: &creds.api_key,
            site_id: &creds.site_id,
            transaction_id: transaction_ref,
        };

        let response: CheckResponse = self.post_json("/v2/payment/check", &body).await?;

        let data = response.data.ok_or(GatewayError::Declined {
            code: response.code,
            message: response.message,
        })?;

        Ok(PaymentCheck {
            status: GatewayPaymentStatus::from_wire(&data.status),
            operator_id: data.operator_id,
            payment_method: data.payment_method,
        })
    }

    /// POST with circuit breaker and a bounded retry on transport errors.
    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let client = self.client.clone();
            let request_url = url.clone();

            let result = self
                .circuit_breaker
                .call(async move {
                    let response = client.post(&request_url).json(body).send().await?;

                    let status = response.status();
                    if status.is_server_error() {
                        return Err(GatewayError::InvalidResponse(format!(
                            "gateway returned HTTP {}",
                            status
                        )));
                    }

                    let parsed = response.json::<T>().await?;
                    Ok(parsed)
                })
                .await;

            match result {
                Ok(parsed) => return Ok(parsed),
                Err(FailsafeError::Rejected) => return Err(GatewayError::CircuitOpen),
                Err(FailsafeError::Inner(error)) => {
                    if attempt < MAX_ATTEMPTS && error.is_transient() {
                        tracing::warn!(
                            %error,
                            attempt,
                            url = %url,
                            "gateway call failed, retrying"
                        );
                        sleep(delay).await;
                        delay *= 2;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }
}
