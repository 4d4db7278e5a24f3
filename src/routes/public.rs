use axum::{Json, Router, routing::get};

pub fn router() -> Router {
    Router::new().route("/health", get(handler))
}

// Liveness probe: fixed payload, no authentication.
async fn handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
