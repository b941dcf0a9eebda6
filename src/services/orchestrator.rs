use bytes::Bytes;
use polars::prelude::DataFrame;

use crate::error::AppError;
use crate::models::{AnalysisStage, RecommendationResult, SamplePreview, StatisticsRecord};
use crate::services::dataset_loader::{self, DatasetFormat};
use crate::services::llm_client::CompletionClient;
use crate::services::profiler;
use crate::services::prompt_builder::PromptBuilder;

/// A dataset that has been profiled successfully.
///
/// Only [`Orchestrator::profile`] builds one, so nothing reaches the
/// recommendation step without a valid profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfiledDataset {
    record: StatisticsRecord,
    sample: SamplePreview,
}

impl ProfiledDataset {
    pub fn record(&self) -> &StatisticsRecord {
        &self.record
    }

    pub fn sample(&self) -> &SamplePreview {
        &self.sample
    }
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub stage: AnalysisStage,
    pub profile: StatisticsRecord,
    pub sample_preview: SamplePreview,
    /// `None` when the caller did not ask for a recommendation.
    pub recommendation: Option<RecommendationResult>,
}

pub struct Orchestrator<C> {
    client: C,
    prompts: PromptBuilder,
}

fn transition(from: AnalysisStage, to: AnalysisStage) -> AnalysisStage {
    tracing::debug!("Analysis stage {:?} -> {:?}", from, to);
    to
}

impl<C: CompletionClient> Orchestrator<C> {
    pub fn new(client: C, prompts: PromptBuilder) -> Self {
        Self { client, prompts }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Idle -> Profiling -> ProfileReady | ProfileFailed.
    pub fn profile(&self, df: &DataFrame) -> Result<ProfiledDataset, AppError> {
        let stage = transition(AnalysisStage::Idle, AnalysisStage::Profiling);

        match profiler::profile(df) {
            Ok(record) => {
                transition(stage, AnalysisStage::ProfileReady);
                let sample = self.prompts.sample_preview(df);
                tracing::info!(
                    "Profile ready: {} rows, {} columns, {} duplicates",
                    record.row_count,
                    record.column_count,
                    record.duplicate_row_count
                );
                Ok(ProfiledDataset { record, sample })
            }
            Err(err) => {
                transition(stage, AnalysisStage::ProfileFailed);
                tracing::warn!("Profiling failed: {}", err);
                Err(err)
            }
        }
    }

    /// Parses an uploaded dataset and profiles it. Parse failures count as
    /// profiling failures.
    pub fn profile_upload(&self, file_data: Bytes, format: DatasetFormat) -> Result<ProfiledDataset, AppError> {
        match dataset_loader::load_dataset(file_data, format) {
            Ok(df) => self.profile(&df),
            Err(err) => {
                let stage = transition(AnalysisStage::Idle, AnalysisStage::Profiling);
                transition(stage, AnalysisStage::ProfileFailed);
                tracing::warn!("Dataset could not be loaded: {}", err);
                Err(err)
            }
        }
    }

    /// One independent completion call per invocation; nothing is cached.
    pub async fn recommend(&self, profiled: &ProfiledDataset) -> RecommendationResult {
        let request = self.prompts.build_request(&profiled.record, &profiled.sample);
        self.client.invoke(&request).await
    }

    /// ProfileReady -> (Recommending -> RecommendationReady | RecommendationFailed).
    /// A failed recommendation leaves the profile in the outcome.
    pub async fn finish(&self, profiled: ProfiledDataset, recommend: bool) -> AnalysisOutcome {
        let (stage, recommendation) = if recommend {
            let stage = transition(AnalysisStage::ProfileReady, AnalysisStage::Recommending);
            let result = self.recommend(&profiled).await;
            let next = if result.is_ok() {
                AnalysisStage::RecommendationReady
            } else {
                AnalysisStage::RecommendationFailed
            };
            (transition(stage, next), Some(result))
        } else {
            (AnalysisStage::ProfileReady, None)
        };

        AnalysisOutcome {
            stage,
            profile: profiled.record,
            sample_preview: profiled.sample,
            recommendation,
        }
    }

    /// Full pipeline for one request. Profiling errors abort before any
    /// completion call is made.
    pub async fn analyze(&self, df: &DataFrame, recommend: bool) -> Result<AnalysisOutcome, AppError> {
        let profiled = self.profile(df)?;
        Ok(self.finish(profiled, recommend).await)
    }
}
