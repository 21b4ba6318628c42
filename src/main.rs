mod accounts;
mod arm;
mod auth;
mod config;
mod error;
mod logging;
mod metrics;
mod models;
mod network;
mod server;
mod tool;
mod validation;

use std::sync::Arc;

use anyhow::Context;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use server::StorageMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    // Write structured logs to stderr so stdout stays clean for MCP JSON-RPC.
    logging::init(config.log_format);

    tracing::info!(
        auth_method = %config.auth.method,
        arm_endpoint = %config.arm_endpoint,
        "Starting azure-storage-mcp v{}",
        env!("CARGO_PKG_VERSION")
    );

    let auth = Arc::new(auth::AuthManager::new(config.auth.clone()));
    if !auth.test_authentication().await {
        tracing::error!(
            auth_method = auth.auth_method(),
            "Azure authentication failed; check credentials and AZURE_AUTH_METHOD"
        );
        anyhow::bail!("Azure authentication failed for method '{}'", auth.auth_method());
    }

    let server = StorageMcpServer::new(auth, &config.arm_endpoint);

    let transport = stdio();

    tracing::info!("MCP server listening on stdio");

    let running = server
        .serve(transport)
        .await
        .context("failed to start MCP service")?;
    running.waiting().await?;

    Ok(())
}
