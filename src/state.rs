use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, shopify::client::ShopifyClient};

#[derive(Clone)]
pub struct AppState {
    pub cfg: AppConfig,
    pub db: DatabaseConnection,
    pub shopify: ShopifyClient,
}

impl AppState {
    pub fn new(cfg: AppConfig, db: DatabaseConnection) -> Arc<Self> {
        let shopify = ShopifyClient::new(&cfg);
        Arc::new(Self { cfg, db, shopify })
    }
}
