use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use immopay_core::AppState;
use immopay_core::cli::{self, Cli, Commands, DbCommands, TxCommands};
use immopay_core::config::Config;
use immopay_core::create_app;
use immopay_core::db;
use immopay_core::gateway::{CinetPayClient, CredentialStore, GatewayCredentials};
use immopay_core::secrets::SecretsManager;
use immopay_core::services::{ExpirySweeper, PaymentInitiator};
use immopay_core::startup;

const VAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Tx(TxCommands::Sweep) => {
            let pool = db::create_pool(&config).await?;
            let credentials = build_credential_store(&config).await?;
            let gateway = CinetPayClient::new(config.cinetpay_base_url.clone(), credentials);
            let sweeper = ExpirySweeper::new(pool, gateway, &config);
            cli::handle_tx_sweep(&sweeper).await
        }
        Commands::Tx(TxCommands::ForceStatus {
            transaction_ref,
            status,
        }) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_force_status(&pool, &transaction_ref, &status).await
        }
        Commands::Config => cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    // The report is advisory: a dead dependency shows up here and again
    // at request time, but only a bad config should stop the boot.
    match startup::validate_environment(&config, &pool).await {
        Ok(report) => {
            report.print();
            if !report.is_valid() {
                tracing::warn!("startup validation reported failures");
            }
        }
        Err(error) => tracing::warn!(%error, "startup validation did not run"),
    }

    let credentials = build_credential_store(&config).await?;
    if SecretsManager::vault_enabled() {
        CredentialStore::spawn_vault_refresher(credentials.clone(), VAULT_REFRESH_INTERVAL);
    }

    let gateway = CinetPayClient::new(config.cinetpay_base_url.clone(), credentials.clone());
    let initiator = PaymentInitiator::new(pool.clone(), gateway.clone(), config.clone());

    // Background expiry/reconciliation sweep
    let sweeper = ExpirySweeper::new(pool.clone(), gateway.clone(), &config);
    tokio::spawn(sweeper.run(config.sweep_schedule.clone()));

    let state = AppState {
        db: pool,
        config: config.clone(),
        credentials,
        gateway,
        initiator,
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Environment credentials seed the store; when Vault is configured it
/// must hand over a working set before the process continues.
async fn build_credential_store(config: &Config) -> anyhow::Result<Arc<CredentialStore>> {
    let store = CredentialStore::new(GatewayCredentials {
        api_key: config.cinetpay_api_key.clone(),
        site_id: config.cinetpay_site_id.clone(),
        secret_key: config.cinetpay_secret_key.clone(),
    });

    if SecretsManager::vault_enabled() {
        let manager = SecretsManager::new().await?;
        let credentials = manager.get_gateway_credentials().await?;
        store.replace(credentials);
        tracing::info!("gateway credentials loaded from vault");
    }

    Ok(store)
}
