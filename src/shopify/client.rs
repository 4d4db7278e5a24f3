use std::time::Duration;

use serde_json::{Value, json};

use crate::{config::AppConfig, error::AppError};

/// Thin client for the commerce platform's admin GraphQL endpoint. One
/// request per call, bounded timeout, no retries.
#[derive(Clone)]
pub struct ShopifyClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl ShopifyClient {
    pub fn new(cfg: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
            .build()
            .expect("reqwest client construction");
        let endpoint = format!(
            "https://{}/admin/api/{}/graphql.json",
            cfg.shopify_shop, cfg.shopify_api_version
        );
        Self {
            http,
            endpoint,
            token: cfg.shopify_admin_token.clone(),
        }
    }

    /// Runs one GraphQL request and returns the `data` object. Transport
    /// failures, non-success statuses, malformed bodies and top-level
    /// GraphQL errors all surface as `AppError::Upstream`; mutation-level
    /// `userErrors` are left for the caller to interpret.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, AppError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|err| {
                tracing::error!("platform request failed: {err}");
                AppError::upstream("Commerce platform unreachable")
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("platform returned status {status}");
            return Err(AppError::upstream("Commerce platform request failed"));
        }

        let body: Value = response.json().await.map_err(|err| {
            tracing::error!("platform returned malformed JSON: {err}");
            AppError::upstream("Commerce platform returned malformed response")
        })?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                tracing::error!("platform GraphQL errors: {errors:?}");
                return Err(AppError::upstream("Commerce platform rejected the request"));
            }
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Raw HTTP client, for the staged-upload POST that targets a
    /// platform-issued URL rather than the GraphQL endpoint.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}
