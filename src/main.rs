use anyhow::Result;
use std::sync::Arc;

use quality_services::{app, config, logging, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration; refuse to start without a credential
    let config = config::Config::from_env()?;
    let addr = config.bind_addr;

    // Build our application state
    let state = Arc::new(AppState::new(config)?);

    // Run it
    tracing::info!(
        "listening on {} (model {})",
        addr,
        state.config.llm.model
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
