pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod routes;
pub mod shopify;
pub mod state;
pub mod test_helpers;
