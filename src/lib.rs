//! Dataset profiling and LLM-assisted data-quality recommendations.
//!
//! Uploaded data is profiled deterministically; only the profile and a few
//! leading rows are ever sent to the completion endpoint.

use std::sync::Arc;

use axum::Router;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use error::AppError;
use services::llm_client::LlmClient;
use services::orchestrator::Orchestrator;
use services::prompt_builder::PromptBuilder;

// Application state
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator<LlmClient>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let mut client = LlmClient::new(config.llm.clone())?;
        if let Some(policy) = config.retry_policy() {
            client = client.with_retry_policy(policy);
        }
        let orchestrator = Orchestrator::new(client, PromptBuilder::new(config.prompt.clone()));

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    routes::routes(state.config.max_file_size).with_state(state)
}
