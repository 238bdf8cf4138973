//! Admin HTTP surface over the job-ingestion Pipeline Orchestrator.
//! Out of scope for the pipeline core proper — this crate
//! is a thin axum adapter that lets an operator trigger and observe
//! runs; all orchestration logic lives in `pipeline_core`.

pub mod app_state;
pub mod error;
pub mod routes;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use app_state::AppState;

pub fn build_app(state: AppState) -> Router {
    routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
