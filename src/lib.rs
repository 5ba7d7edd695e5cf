pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use std::sync::Arc;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::gateway::{CinetPayClient, CredentialStore};
use crate::middleware::idempotency::IdempotencyService;
use crate::middleware::ip_filter::IpFilterLayer;
use crate::middleware::rate_limit;
use crate::services::PaymentInitiator;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub credentials: Arc<CredentialStore>,
    pub gateway: CinetPayClient,
    pub initiator: PaymentInitiator,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::payments::initialize_deposit,
        handlers::payments::get_payment,
        handlers::payments::list_payments,
        handlers::webhook::notify,
        handlers::export::export_transactions,
    ),
    components(schemas(
        handlers::HealthStatus,
        handlers::DbPoolStats,
        handlers::payments::InitializeDepositRequest,
        handlers::webhook::NotificationAck,
        db::models::TransactionRow,
        services::DepositInitiated,
    )),
    tags(
        (name = "Payments", description = "Deposit initiation, notification and lookups"),
        (name = "Admin", description = "Operator-only endpoints"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Duplicate suppression needs Redis; losing it degrades the ledger
    // to plain at-least-once, it does not take the service down.
    let idempotency = match IdempotencyService::new(&config.redis_url) {
        Ok(service) => Some(service),
        Err(err) => {
            tracing::warn!(error = %err, "idempotency ledger disabled");
            None
        }
    };

    let limiter = rate_limit::build_rate_limiter(config.rate_limit_per_minute);

    let initiate_routes = Router::new()
        .route(
            "/payments/initialize",
            post(handlers::payments::initialize_deposit),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            idempotency,
            middleware::idempotency::idempotency_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));

    let notify_routes = Router::new()
        .route("/payments/notify", post(handlers::webhook::notify))
        .route_layer(IpFilterLayer::new(
            config.allowed_notify_ips.clone(),
            config.trusted_proxy_depth,
        ));

    let admin_routes = Router::new()
        .route(
            "/transactions/export",
            get(handlers::export::export_transactions),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            config.clone(),
            middleware::admin_auth::admin_auth,
        ));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", get(handlers::payments::list_payments))
        .route(
            "/payments/:transaction_ref",
            get(handlers::payments::get_payment),
        )
        .merge(initiate_routes)
        .merge(notify_routes)
        .merge(admin_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn_with_state(
            config.clone(),
            middleware::request_logger::request_logger_middleware,
        ));

    if let Some(cors) = cors_layer(&config) {
        app = app.layer(cors);
    }

    app.with_state(state)
}

fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origins = config.cors_allowed_origins.as_ref()?;

    if origins.iter().any(|origin| origin == "*") {
        return Some(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
