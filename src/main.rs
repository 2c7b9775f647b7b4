//! Lacework MCP Server - Main entry point.

use clap::Parser;
use lacework_mcp_server::build_dispatcher;
use lacework_mcp_server::config::{Config, TransportMode};
use lacework_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr; stdout belongs to
/// the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    // Incomplete credentials must stop the process before it serves anything.
    let dispatcher = match build_dispatcher(&config) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Usage: LW_ACCOUNT=<account> LW_KEY_ID=<key id> LW_SECRET=<secret> lacework-mcp-server");
            eprintln!("       lacework-mcp-server --account <account> --key-id <key id> --secret <secret>");
            std::process::exit(1);
        }
    };

    info!(
        transport = %config.transport,
        "Starting Lacework MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = match config.transport {
        TransportMode::Stdio => StdioTransport::new(dispatcher).run().await,
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                dispatcher,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
