//! `POST /admin/companies/discover`, runs the ATS Detector
//! against one operator-supplied company instead of a
//! Discovery Source's stream, for manual "find this company's ATS" use.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use pipeline_core::ats::Detector;
use pipeline_core::models::Company;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DiscoverCompanyRequest {
    pub name: String,
    pub domain: Option<String>,
    pub careers_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverCompanyResponse {
    pub company_id: Uuid,
    pub ats_family: Option<String>,
    pub ats_identifier: Option<String>,
}

pub async fn discover_company(
    State(state): State<AppState>,
    Json(body): Json<DiscoverCompanyRequest>,
) -> Result<(StatusCode, Json<DiscoverCompanyResponse>), ApiError> {
    let careers_url = body
        .careers_url
        .clone()
        .or_else(|| body.domain.as_ref().map(|d| format!("https://{d}")))
        .ok_or_else(|| ApiError::BadRequest("careers_url or domain is required".to_string()))?;

    let mut company = if let Some(domain) = &body.domain {
        match state.storage.get_company_by_domain(domain).await? {
            Some(existing) => existing,
            None => {
                let mut c = Company::new(body.name.clone());
                c.domain = Some(domain.clone());
                c.crawl_priority = 30;
                c
            }
        }
    } else {
        Company::new(body.name.clone())
    };
    company.careers_url = Some(body.careers_url.clone().unwrap_or_else(|| careers_url.clone()));

    let detector = Detector::new(state.fetcher.as_ref());
    let detection = detector
        .detect_from_careers_url(&careers_url, body.domain.as_deref())
        .await
        .ok();

    let (ats_family, ats_identifier) = match &detection {
        Some(result) => (Some(result.family), result.identifier.clone()),
        None => {
            company.ats_detection_attempts += 1;
            company.ats_detection_last_at = Some(chrono::Utc::now());
            (None, None)
        }
    };
    company.ats_family = ats_family;
    company.ats_identifier = ats_identifier.clone();

    let is_new = state.storage.get_company(company.id).await?.is_none();
    let saved = if is_new {
        match state.storage.insert_company(company.clone()).await {
            Ok(saved) => saved,
            Err(e) if e.is_unique_violation() => {
                let domain = company.domain.clone().unwrap_or_default();
                state
                    .storage
                    .get_company_by_domain(&domain)
                    .await?
                    .ok_or(ApiError::NotFound)?
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        state.storage.update_company(&company).await?;
        company
    };

    Ok((
        StatusCode::OK,
        Json(DiscoverCompanyResponse {
            company_id: saved.id.0,
            ats_family: saved.ats_family.map(|f| f.as_str().to_string()),
            ats_identifier: saved.ats_identifier,
        }),
    ))
}
