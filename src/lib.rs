//! Lacework MCP Server Library
//!
//! This library exposes Lacework cloud security querying (inventory, LQL
//! queries, alerts and compliance evaluations) as MCP tools.
//!
//! The pipeline, leaf first:
//!
//! - [`session::TokenManager`]: bearer token lifecycle with single-flight refresh
//! - [`lacework::LaceworkClient`]: authenticated HTTP calls with bounded retries
//! - [`query::QueryExecutor`]: pagination and error mapping
//! - [`tools::Dispatcher`]: argument validation and result normalization
//! - [`mcp::LaceworkService`]: the rmcp tool surface

pub mod config;
pub mod error;
pub mod lacework;
pub mod mcp;
pub mod models;
pub mod query;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, ServerError};
pub use mcp::LaceworkService;

use crate::lacework::LaceworkClient;
use crate::query::QueryExecutor;
use crate::session::TokenManager;
use crate::tools::Dispatcher;
use std::sync::Arc;

/// Validate `config` and wire the full pipeline.
///
/// Fails on incomplete credentials, an unusable base URL or CA bundle, or an
/// unreadable query catalog. No network call is made.
pub fn build_dispatcher(config: &Config) -> Result<Arc<Dispatcher>, ConfigError> {
    let credentials = Arc::new(config.credentials()?);
    let client = Arc::new(LaceworkClient::new(&credentials, config.client_settings())?);
    let tokens = Arc::new(TokenManager::new(credentials, client.clone()));
    let executor = QueryExecutor::new(tokens, client).with_max_pages(config.max_pages);
    let dispatcher = Dispatcher::new(Arc::new(executor))
        .with_catalog(config.load_catalog()?)
        .with_normalize_options(config.normalize_options());
    Ok(Arc::new(dispatcher))
}
