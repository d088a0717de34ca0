mod server;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lektor_common::api::{ReviewApiClient, ReviewApiConfig};
use lektor_workflow::config::WorkflowConfig;
use lektor_workflow::orchestrator::Orchestrator;

use server::LektorServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting lektor MCP server");

    let api_config = ReviewApiConfig::from_env();
    info!(
        base_url = %api_config.base_url,
        timeout_ms = api_config.timeout.as_millis(),
        max_retries = api_config.max_retries,
        "review API client configured"
    );
    let client = Arc::new(ReviewApiClient::new(api_config)?);

    let workflow_config = WorkflowConfig::from_env()?;
    info!(
        languages = ?workflow_config.languages,
        default_language = %workflow_config.default_language,
        "workflow configured"
    );

    let session = Arc::new(Orchestrator::new(client, workflow_config));
    match session.list_guidelines().await {
        Ok(list) => info!(count = list.len(), "saved guidelines loaded"),
        Err(e) => warn!(error = %e, "guideline store unavailable, starting with an empty list"),
    }

    let server = LektorServer::new(session);

    if let Ok(addr) = std::env::var("MCP_TCP_LISTEN_ADDR") {
        let listener = TcpListener::bind(&addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
