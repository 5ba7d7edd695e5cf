use bigdecimal::BigDecimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::auth::Session;
use crate::config::Config;
use crate::db::queries;
use crate::domain::Transaction;
use crate::error::AppError;
use crate::gateway::{CinetPayClient, InitializePaymentRequest};
use crate::validation;

/// What the caller gets back from a successful initiation: the reference
/// to poll on and the URL to send the customer to.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepositInitiated {
    pub transaction_id: String,
    pub payment_token: String,
    pub payment_url: String,
    #[schema(value_type = String, example = "5000")]
    pub amount: BigDecimal,
    pub currency: String,
}

/// Orchestrates a deposit initiation: validate, record locally, then ask
/// the gateway for a payment link.
#[derive(Clone)]
pub struct PaymentInitiator {
    pool: PgPool,
    gateway: CinetPayClient,
    config: Config,
}

impl PaymentInitiator {
    pub fn new(pool: PgPool, gateway: CinetPayClient, config: Config) -> Self {
        Self {
            pool,
            gateway,
            config,
        }
    }

    pub async fn initiate(
        &self,
        session: &Session,
        amount: Option<BigDecimal>,
    ) -> Result<DepositInitiated, AppError> {
        let amount = amount
            .ok_or_else(|| AppError::InvalidAmount("amount is required".to_string()))?;
        validation::validate_positive_amount(&amount)
            .map_err(|e| AppError::InvalidAmount(e.message))?;

        // The row is written before the gateway is contacted, so every
        // attempt is traceable even if the call below never lands.
        let tx = Transaction::new_deposit(session.agent_id, amount);
        let recorded = queries::insert_transaction(&self.pool, &tx)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        info!(
            transaction_ref = %recorded.transaction_ref,
            agent_id = %session.agent_id,
            amount = %recorded.amount,
            "deposit transaction recorded"
        );

        let (customer_name, customer_surname) = session.customer_names();
        let request = InitializePaymentRequest {
            transaction_id: recorded.transaction_ref.clone(),
            amount: recorded.amount.clone(),
            currency: recorded.currency.clone(),
            description: self.config.payment_description.clone(),
            customer_name,
            customer_surname,
            customer_email: session.email.clone(),
            customer_phone_number: session.phone.clone(),
            notify_url: self.config.payment_notify_url.clone(),
            return_url: self.config.payment_return_url.clone(),
            channels: self.config.payment_channels.clone(),
        };

        let initiated = match self.gateway.initialize_payment(&request).await {
            Ok(initiated) => initiated,
            Err(e) => {
                // The PENDING row stays behind; the sweeper or a retry
                // will pick it up.
                error!(
                    transaction_ref = %recorded.transaction_ref,
                    error = %e,
                    "gateway initialization failed"
                );
                return Err(AppError::Gateway(e));
            }
        };

        if let Err(e) =
            queries::set_payment_token(&self.pool, recorded.id, &initiated.payment_token).await
        {
            warn!(
                transaction_ref = %recorded.transaction_ref,
                error = %e,
                "failed to record payment token"
            );
        }

        info!(
            transaction_ref = %recorded.transaction_ref,
            api_response_id = ?initiated.api_response_id,
            "payment link created"
        );

        Ok(DepositInitiated {
            transaction_id: recorded.transaction_ref,
            payment_token: initiated.payment_token,
            payment_url: initiated.payment_url,
            amount: recorded.amount,
            currency: recorded.currency,
        })
    }
}
