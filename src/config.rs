use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_idle: u32,
    /// Shared secret for app-proxy signature verification. Required — a
    /// missing secret is a fatal startup condition, never a skipped check.
    pub proxy_shared_secret: String,
    pub shopify_shop: String,
    pub shopify_admin_token: String,
    pub shopify_api_version: String,
    pub upstream_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid u16")?;
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".to_string());

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DB_MAX_CONNECTIONS must be a valid u32")?;
        let db_min_idle = std::env::var("DB_MIN_IDLE")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u32>()
            .context("DB_MIN_IDLE must be a valid u32")?;

        let proxy_shared_secret = std::env::var("PROXY_SHARED_SECRET")
            .context("PROXY_SHARED_SECRET is required; refusing to serve unverified requests")?;

        let shopify_shop = std::env::var("SHOPIFY_SHOP").context("SHOPIFY_SHOP is required")?;
        let shopify_admin_token =
            std::env::var("SHOPIFY_ADMIN_TOKEN").context("SHOPIFY_ADMIN_TOKEN is required")?;
        let shopify_api_version =
            std::env::var("SHOPIFY_API_VERSION").unwrap_or_else(|_| "2024-07".to_string());
        let upstream_timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse::<u64>()
            .context("UPSTREAM_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            host,
            port,
            log_level,
            database_url,
            db_max_connections,
            db_min_idle,
            proxy_shared_secret,
            shopify_shop,
            shopify_admin_token,
            shopify_api_version,
            upstream_timeout_secs,
        })
    }
}
