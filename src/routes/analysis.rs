use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::{AppError, RecommendationError},
    models::{AnalysisStage, Recommendation, SamplePreview, StatisticsRecord},
    services::dataset_loader::DatasetFormat,
    services::orchestrator::AnalysisOutcome,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analysis", post(analyze_dataset))
        .route("/analysis/profile", post(profile_dataset))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisParams {
    #[serde(default)]
    recommend: bool,
    format: Option<DatasetFormat>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    stage: AnalysisStage,
    profile: StatisticsRecord,
    numeric_summary_table: String,
    sample_preview: SamplePreview,
    recommendation: Option<Recommendation>,
    recommendation_error: Option<RecommendationError>,
}

impl From<AnalysisOutcome> for AnalysisResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        let (recommendation, recommendation_error) = match outcome.recommendation {
            Some(Ok(rec)) => (Some(rec), None),
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };

        AnalysisResponse {
            stage: outcome.stage,
            numeric_summary_table: outcome.profile.render_numeric_summary(),
            profile: outcome.profile,
            sample_preview: outcome.sample_preview,
            recommendation,
            recommendation_error,
        }
    }
}

fn resolve_format(params: &AnalysisParams, headers: &HeaderMap) -> DatasetFormat {
    params
        .format
        .or_else(|| {
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(DatasetFormat::from_content_type)
        })
        .unwrap_or_default()
}

async fn run_analysis(
    state: Arc<AppState>,
    file_data: Bytes,
    format: DatasetFormat,
    recommend: bool,
) -> Result<AnalysisResponse, AppError> {
    let start = std::time::Instant::now();
    tracing::info!(
        "Starting analysis: {:?} upload, {}KB, recommend={}",
        format,
        file_data.len() / 1024,
        recommend
    );

    // Parsing and profiling are CPU-bound; keep them off the async workers.
    let orchestrator = state.orchestrator.clone();
    let profiled = tokio::task::spawn_blocking(move || orchestrator.profile_upload(file_data, format))
        .await
        .map_err(|e| AppError::ProfilingInternal(format!("Profiling task failed: {}", e)))??;

    let outcome = state.orchestrator.finish(profiled, recommend).await;
    tracing::info!("Analysis finished at {:?} in {:?}", outcome.stage, start.elapsed());

    Ok(outcome.into())
}

async fn profile_dataset(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalysisParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AnalysisResponse>, AppError> {
    let format = resolve_format(&params, &headers);
    run_analysis(state, body, format, false).await.map(Json)
}

async fn analyze_dataset(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalysisParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AnalysisResponse>, AppError> {
    let format = resolve_format(&params, &headers);
    run_analysis(state, body, format, params.recommend).await.map(Json)
}
