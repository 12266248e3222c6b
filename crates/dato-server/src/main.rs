//! MCP server entry point.
//!
//! Serves the DatoCMS toolset over stdio. Logging goes to stderr (stdout
//! carries the MCP protocol).
//!
//! # Usage
//!
//! ```bash
//! DATOCMS_API_TOKEN=… datocms-mcp-server
//! ```
//!
//! Without a token, only the documentation and script-authoring tools
//! register.

use anyhow::Result;
use dato_mcp_core::Config;
use dato_mcp_server::{AppState, DatoCmsService};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dato_mcp_server=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();

    tracing::info!("starting datocms-mcp-server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(config)?);
    let service = DatoCmsService::new(state).serve(stdio()).await?;
    service.waiting().await?;

    tracing::info!("server shutdown complete");
    Ok(())
}
