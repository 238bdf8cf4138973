//! `/admin/pipeline/*` and `/admin/runs/*` Every handler here
//! is a thin adapter: validation and shape translation only, with the
//! orchestration logic living in `pipeline_core::pipeline_orchestrator`.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use pipeline_core::models::{AtsFamily, DiscoveryRunId, PipelineRunId, RunStatus};
use pipeline_core::pipeline_orchestrator::PipelineRunOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct RunPipelineRequest {
    #[serde(default)]
    pub skip_discovery: bool,
    #[serde(default)]
    pub skip_crawl: bool,
    #[serde(default)]
    pub skip_enrichment: bool,
    #[serde(default)]
    pub skip_embeddings: bool,
}

#[derive(Debug, Serialize)]
pub struct RunAcceptedResponse {
    pub run_id: Uuid,
}

/// `POST /admin/pipeline/run` — launches Discovery → Crawl → Enrich →
/// Embed under the single `full_pipeline` key and returns immediately;
/// the caller polls `GET /admin/runs/:id` for progress.
pub async fn run_full_pipeline(
    State(state): State<AppState>,
    Json(body): Json<RunPipelineRequest>,
) -> Result<(StatusCode, Json<RunAcceptedResponse>), ApiError> {
    let options = PipelineRunOptions {
        skip_discovery: body.skip_discovery,
        skip_crawl: body.skip_crawl,
        skip_enrichment: body.skip_enrichment,
        skip_embeddings: body.skip_embeddings,
    };
    let sources = state.default_sources();
    let run = state
        .orchestrator
        .run_full_pipeline_with_options(sources, options)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(RunAcceptedResponse { run_id: run.id.0 })))
}

#[derive(Debug, Deserialize, Default)]
pub struct RunStageRequest {
    pub ats_family: Option<String>,
}

/// `POST /admin/pipeline/:stage/run` — `stage` is one of `discovery`,
/// `crawl`, `enrich`, `embeddings`; `crawl`/`enrich` may be sharded by
/// `ats_family` in the request body so distinct shards run concurrently
/// under distinct operation keys.
pub async fn run_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
    Json(body): Json<RunStageRequest>,
) -> Result<(StatusCode, Json<RunAcceptedResponse>), ApiError> {
    let family = match body.ats_family.clone() {
        Some(raw) => Some(
            AtsFamily::from_str(&raw)
                .map_err(|_| ApiError::BadRequest(format!("unknown ats_family '{raw}'")))?,
        ),
        None => None,
    };

    let run_id = match stage.as_str() {
        "discovery" => {
            let sources = state.default_sources();
            let run = state.orchestrator.run_discovery_standalone(sources).await?;
            run.id.0
        }
        "crawl" => {
            let run = state.orchestrator.run_crawl_standalone(family).await?;
            run.id.0
        }
        "enrich" => {
            let run = state.orchestrator.run_enrich_standalone(family).await?;
            run.id.0
        }
        "embeddings" => {
            let run = state.orchestrator.run_embeddings_standalone().await?;
            run.id.0
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown pipeline stage '{other}'"
            )))
        }
    };

    Ok((StatusCode::ACCEPTED, Json(RunAcceptedResponse { run_id })))
}

/// `GET /admin/runs/:id` — a run id is a plain UUID; whichever run
/// table it resolves against (PipelineRun or DiscoveryRun) is returned
/// as-is. Both share `RunRecord`'s shape, so callers don't need to know
/// which kind they asked for.
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(run) = state.storage.get_pipeline_run(PipelineRunId(id)).await? {
        return Ok(Json(serde_json::to_value(run).map_err(anyhow::Error::from)?));
    }
    if let Some(run) = state.storage.get_discovery_run(DiscoveryRunId(id)).await? {
        return Ok(Json(serde_json::to_value(run).map_err(anyhow::Error::from)?));
    }
    Err(ApiError::NotFound)
}

/// `POST /admin/runs/:id/cancel` — flips a running run's status to
/// `cancelled`; the run's own batch loop notices on its next check
/// (cancellation is cooperative, not preemptive).
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(mut run) = state.storage.get_pipeline_run(PipelineRunId(id)).await? {
        if !run.status.is_terminal() {
            run.status = RunStatus::Cancelled;
            run.log(
                pipeline_core::models::RunLogLevel::Info,
                "cancellation requested via admin API",
            );
            state.storage.update_pipeline_run(&run).await?;
        }
        return Ok(Json(serde_json::to_value(run).map_err(anyhow::Error::from)?));
    }
    if let Some(mut run) = state.storage.get_discovery_run(DiscoveryRunId(id)).await? {
        if !run.status.is_terminal() {
            run.status = RunStatus::Cancelled;
            run.log(
                pipeline_core::models::RunLogLevel::Info,
                "cancellation requested via admin API",
            );
            state.storage.update_discovery_run(&run).await?;
        }
        return Ok(Json(serde_json::to_value(run).map_err(anyhow::Error::from)?));
    }
    Err(ApiError::NotFound)
}
