use crate::config::Config;
use anyhow::{Context, Result};
use cron::Schedule;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis && self.gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));
        println!("Gateway Connectivity:  {}", status(self.gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "✅ PASS" } else { "❌ FAIL" }
        );
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        gateway: true,
        errors: Vec::new(),
    };

    // Validate environment variables
    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    // Validate database
    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    // Validate Redis
    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {}", e));
    }

    // Validate the payment gateway host
    if let Err(e) = validate_gateway(&config.cinetpay_base_url).await {
        report.gateway = false;
        report.errors.push(format!("Gateway: {}", e));
    }

    Ok(report)
}

pub(crate) fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.redis_url.is_empty() {
        anyhow::bail!("REDIS_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.cinetpay_api_key.is_empty() {
        anyhow::bail!("CINETPAY_API_KEY is empty");
    }
    if config.cinetpay_site_id.is_empty() {
        anyhow::bail!("CINETPAY_SITE_ID is empty");
    }
    if config.cinetpay_secret_key.is_empty() {
        anyhow::bail!("CINETPAY_SECRET_KEY is empty");
    }
    if config.admin_api_key.is_empty() {
        anyhow::bail!("ADMIN_API_KEY is empty");
    }
    if config.pending_ttl_minutes <= 0 {
        anyhow::bail!("PENDING_TTL_MINUTES must be greater than 0");
    }
    if config.expiry_cutoff_minutes <= 0 {
        anyhow::bail!("EXPIRY_CUTOFF_MINUTES must be greater than 0");
    }

    // Validate URL formats
    url::Url::parse(&config.cinetpay_base_url).context("CINETPAY_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.payment_notify_url)
        .context("PAYMENT_NOTIFY_URL is not a valid URL")?;
    url::Url::parse(&config.payment_return_url)
        .context("PAYMENT_RETURN_URL is not a valid URL")?;

    Schedule::from_str(&config.sweep_schedule)
        .context("EXPIRY_SWEEP_SCHEDULE is not a valid cron expression")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    // Check if migrations are up to date
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

async fn validate_gateway(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    // The checkout API answers 404 on its bare root; any HTTP answer
    // proves the host is reachable.
    client
        .get(base_url)
        .send()
        .await
        .context("Failed to reach the payment gateway")?;

    Ok(())
}
