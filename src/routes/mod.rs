use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub mod proxy;
pub mod public;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(public::router())
        .merge(proxy::router(state))
}
