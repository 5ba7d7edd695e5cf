pub mod admin_auth;
pub mod idempotency;
pub mod ip_filter;
pub mod rate_limit;
pub mod request_logger;
