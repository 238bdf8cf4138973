pub mod companies;
pub mod health;
pub mod pipeline;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/admin/pipeline/run", post(pipeline::run_full_pipeline))
        .route("/admin/pipeline/:stage/run", post(pipeline::run_stage))
        .route("/admin/runs/:id", get(pipeline::get_run))
        .route("/admin/runs/:id/cancel", post(pipeline::cancel_run))
        .route("/admin/companies/discover", post(companies::discover_company))
}
