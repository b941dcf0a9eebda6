pub mod dataset_loader;
pub mod llm_client;
pub mod orchestrator;
pub mod profiler;
pub mod prompt_builder;
pub mod retry;
