use anyhow::{Context, Result};
use dotenvy::dotenv;
use ipnet::IpNet;
use std::env;
use std::net::IpAddr;

/// Source ranges allowed to deliver payment notifications.
#[derive(Debug, Clone)]
pub enum AllowedIps {
    Any,
    Cidrs(Vec<IpNet>),
}

impl AllowedIps {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match self {
            AllowedIps::Any => true,
            AllowedIps::Cidrs(cidrs) => cidrs.iter().any(|net| net.contains(&ip)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub cinetpay_base_url: String,
    pub cinetpay_api_key: String,
    pub cinetpay_site_id: String,
    pub cinetpay_secret_key: String,
    pub payment_notify_url: String,
    pub payment_return_url: String,
    pub payment_channels: String,
    pub payment_description: String,
    pub allowed_notify_ips: AllowedIps,
    pub trusted_proxy_depth: usize,
    pub admin_api_key: String,
    pub pending_ttl_minutes: i64,
    pub expiry_cutoff_minutes: i64,
    pub sweep_schedule: String,
    pub rate_limit_per_minute: u32,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let allowed_notify_ips = parse_allowed_ips(
            &env::var("ALLOWED_NOTIFY_IPS").unwrap_or_else(|_| "*".to_string()),
        )?;

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            redis_url: env::var("REDIS_URL").context("REDIS_URL is required")?,
            cinetpay_base_url: env::var("CINETPAY_BASE_URL")
                .unwrap_or_else(|_| "https://api-checkout.cinetpay.com".to_string()),
            cinetpay_api_key: env::var("CINETPAY_API_KEY")
                .context("CINETPAY_API_KEY is required")?,
            cinetpay_site_id: env::var("CINETPAY_SITE_ID")
                .context("CINETPAY_SITE_ID is required")?,
            cinetpay_secret_key: env::var("CINETPAY_SECRET_KEY")
                .context("CINETPAY_SECRET_KEY is required")?,
            payment_notify_url: env::var("PAYMENT_NOTIFY_URL")
                .context("PAYMENT_NOTIFY_URL is required")?,
            payment_return_url: env::var("PAYMENT_RETURN_URL")
                .context("PAYMENT_RETURN_URL is required")?,
            payment_channels: env::var("PAYMENT_CHANNELS").unwrap_or_else(|_| "ALL".to_string()),
            payment_description: env::var("PAYMENT_DESCRIPTION")
                .unwrap_or_else(|_| "Depot agence".to_string()),
            allowed_notify_ips,
            trusted_proxy_depth: env::var("TRUSTED_PROXY_DEPTH")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
            admin_api_key: env::var("ADMIN_API_KEY").context("ADMIN_API_KEY is required")?,
            pending_ttl_minutes: env::var("PENDING_TTL_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            expiry_cutoff_minutes: env::var("EXPIRY_CUTOFF_MINUTES")
                .unwrap_or_else(|_| "1440".to_string())
                .parse()?,
            sweep_schedule: env::var("EXPIRY_SWEEP_SCHEDULE")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok().map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            log_request_body: env::var("LOG_REQUEST_BODY")
                .map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

fn parse_allowed_ips(raw: &str) -> Result<AllowedIps> {
    let value = raw.trim();
    if value == "*" {
        return Ok(AllowedIps::Any);
    }

    let cidrs = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse::<IpNet>)
        .collect::<Result<Vec<_>, _>>()?;

    if cidrs.is_empty() {
        anyhow::bail!("ALLOWED_NOTIFY_IPS must be '*' or a comma-separated list of CIDRs");
    }

    Ok(AllowedIps::Cidrs(cidrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_everything() {
        let allowed = parse_allowed_ips("*").expect("wildcard parses");
        assert!(allowed.contains("203.0.113.7".parse().unwrap()));
        assert!(allowed.contains("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn cidr_list_restricts_sources() {
        let allowed = parse_allowed_ips("203.0.113.0/24, 198.51.100.10/32").expect("cidrs parse");

        assert!(allowed.contains("203.0.113.42".parse().unwrap()));
        assert!(allowed.contains("198.51.100.10".parse().unwrap()));
        assert!(!allowed.contains("198.51.100.11".parse().unwrap()));
        assert!(!allowed.contains("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn rejects_garbage_and_empty_lists() {
        assert!(parse_allowed_ips("not-a-cidr").is_err());
        assert!(parse_allowed_ips(" , ,").is_err());
    }
}
