//! Configuration handling for the Lacework MCP Server.
//!
//! All settings come from CLI arguments with environment variable fallbacks.
//! [`Config::credentials`] is the startup validation step: the server does
//! not serve tool calls until it succeeds.

use crate::error::ConfigError;
use crate::lacework::{ClientSettings, RetryPolicy};
use crate::models::{Credentials, DEFAULT_TOKEN_EXPIRY_SECS};
use crate::query::DEFAULT_MAX_PAGES;
use crate::tools::normalize::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_MAX_ROWS};
use crate::tools::{NormalizeOptions, QueryCatalog};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = crate::lacework::retry::DEFAULT_MAX_ATTEMPTS;
pub const DEFAULT_RETRY_BASE_MS: u64 = crate::lacework::retry::DEFAULT_BASE_DELAY_MS;

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the Lacework MCP Server.
#[derive(Clone, Parser)]
#[command(
    name = "lacework-mcp-server",
    about = "MCP server exposing Lacework inventory, LQL queries, alerts and compliance search",
    version,
    author
)]
pub struct Config {
    /// Lacework account name (e.g. "mycorp" or "mycorp.lacework.net")
    #[arg(long, env = "LW_ACCOUNT")]
    pub account: Option<String>,

    /// API key id
    #[arg(long, env = "LW_KEY_ID")]
    pub key_id: Option<String>,

    /// API secret
    #[arg(long, env = "LW_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Sub-account sent with every request
    #[arg(long, env = "LW_SUBACCOUNT")]
    pub subaccount: Option<String>,

    /// Requested token lifetime in seconds
    #[arg(long, env = "LW_EXPIRY", default_value_t = DEFAULT_TOKEN_EXPIRY_SECS)]
    pub expiry: u64,

    /// API root override (default: https://{account}.lacework.net/api/v2)
    #[arg(long, env = "LW_BASE_URL")]
    pub base_url: Option<String>,

    /// Extra PEM root certificate for TLS-inspecting proxies
    #[arg(long, env = "LW_CA_BUNDLE")]
    pub ca_bundle: Option<PathBuf>,

    /// Honor HTTP(S)_PROXY environment variables (set to 0 to disable)
    #[arg(
        long,
        env = "LW_TRUST_ENV",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub trust_env: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "LW_REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Connection timeout in seconds
    #[arg(long, env = "LW_CONNECT_TIMEOUT", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Attempts per API call for transient failures
    #[arg(long, env = "LW_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (doubles per attempt)
    #[arg(long, env = "LW_RETRY_BASE_MS", default_value_t = DEFAULT_RETRY_BASE_MS)]
    pub retry_base_ms: u64,

    /// Maximum pages fetched per tool call
    #[arg(long, env = "LW_MAX_PAGES", default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    /// Maximum rows returned per tool call
    #[arg(long, env = "LW_MAX_ROWS", default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    /// Maximum serialized size of returned rows in bytes
    #[arg(long, env = "LW_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    pub max_payload_bytes: usize,

    /// JSON file declaring required parameters of saved queries
    #[arg(long, env = "LW_QUERY_CATALOG")]
    pub query_catalog: Option<PathBuf>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MCP_HTTP_PORT")]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("account", &self.account)
            .field("key_id", &self.key_id)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("subaccount", &self.subaccount)
            .field("expiry", &self.expiry)
            .field("base_url", &self.base_url)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration without credentials (useful for testing).
    pub fn default_config() -> Self {
        Self {
            account: None,
            key_id: None,
            secret: None,
            subaccount: None,
            expiry: DEFAULT_TOKEN_EXPIRY_SECS,
            base_url: None,
            ca_bundle: None,
            trust_env: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            max_pages: DEFAULT_MAX_PAGES,
            max_rows: DEFAULT_MAX_ROWS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            query_catalog: None,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Validate and build the credential set.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::new(
            self.account.as_deref().unwrap_or_default(),
            self.key_id.as_deref().unwrap_or_default(),
            self.secret.as_deref().unwrap_or_default(),
            self.subaccount.as_deref(),
            self.expiry,
        )
    }

    /// HTTP client settings.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.base_url.clone().filter(|u| !u.trim().is_empty()),
            request_timeout: self.request_timeout_duration(),
            connect_timeout: self.connect_timeout_duration(),
            ca_bundle: self.ca_bundle.clone(),
            trust_env: self.trust_env,
            retry: self.retry_policy(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_rows: self.max_rows.max(1),
            max_payload_bytes: self.max_payload_bytes.max(1),
            ..NormalizeOptions::default()
        }
    }

    /// Load the saved query catalog, or an empty one when none is configured.
    pub fn load_catalog(&self) -> Result<QueryCatalog, ConfigError> {
        match &self.query_catalog {
            Some(path) => QueryCatalog::load(path),
            None => Ok(QueryCatalog::default()),
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_credentials() -> Config {
        Config {
            account: Some("mycorp.lacework.net".to_string()),
            key_id: Some("MYCORP_ABC".to_string()),
            secret: Some("_s3cr3t".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.expiry, 3600);
        assert_eq!(config.max_pages, 50);
        assert!(config.trust_env);
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_credentials_valid() {
        let creds = with_credentials().credentials().unwrap();
        assert_eq!(creds.account(), "mycorp");
        assert_eq!(creds.key_id(), "MYCORP_ABC");
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let config = Config {
            secret: None,
            ..with_credentials()
        };
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("LW_SECRET"));

        let config = Config {
            secret: Some("   ".to_string()),
            ..with_credentials()
        };
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_missing_account_and_key() {
        let config = Config {
            account: None,
            ..with_credentials()
        };
        assert!(config.credentials().unwrap_err().to_string().contains("LW_ACCOUNT"));

        let config = Config {
            key_id: Some(String::new()),
            ..with_credentials()
        };
        assert!(config.credentials().unwrap_err().to_string().contains("LW_KEY_ID"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let text = format!("{:?}", with_credentials());
        assert!(!text.contains("_s3cr3t"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn test_client_settings() {
        let config = Config {
            request_timeout: 5,
            connect_timeout: 2,
            max_retries: 4,
            retry_base_ms: 10,
            base_url: Some("  ".to_string()),
            ..with_credentials()
        };
        let settings = config.client_settings();
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.connect_timeout, Duration::from_secs(2));
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(10));
        assert!(settings.base_url.is_none());
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::try_parse_from([
            "lacework-mcp-server",
            "--account",
            "demo",
            "--trust-env",
            "0",
            "--max-rows",
            "25",
            "--transport",
            "http",
        ])
        .unwrap();
        assert_eq!(config.account.as_deref(), Some("demo"));
        assert!(!config.trust_env);
        assert_eq!(config.normalize_options().max_rows, 25);
        assert_eq!(config.transport, TransportMode::Http);
    }

    #[test]
    fn test_catalog_optional() {
        assert!(Config::default().load_catalog().unwrap().is_empty());
        let config = Config {
            query_catalog: Some(PathBuf::from("/nonexistent/catalog.json")),
            ..Config::default()
        };
        assert!(config.load_catalog().is_err());
    }
}
