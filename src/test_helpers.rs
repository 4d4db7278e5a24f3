use std::sync::Arc;

use axum::Router;
use sea_orm::{DatabaseBackend, MockDatabase};

use crate::{config::AppConfig, routes::router, state::AppState};

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        log_level: "info".to_string(),
        database_url: "postgres://localhost/unused".to_string(),
        db_max_connections: 1,
        db_min_idle: 1,
        proxy_shared_secret: TEST_SECRET.to_string(),
        shopify_shop: "test-shop.myshopify.com".to_string(),
        shopify_admin_token: "test-token".to_string(),
        shopify_api_version: "2024-07".to_string(),
        upstream_timeout_secs: 1,
    }
}

/// Router over a mock connection, for exercising the request pipeline up
/// to (but not into) the store.
pub fn test_router() -> Router {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let state = AppState::new(test_config(), db);
    router(Arc::clone(&state))
}
