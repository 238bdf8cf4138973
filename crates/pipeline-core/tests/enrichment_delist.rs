//! End-to-end: a 404 from a family's detail endpoint during enrichment
//! delists the job rather than surfacing as an error.

use pipeline_core::enrichment::{EnrichOutcome, EnrichmentEngine};
use pipeline_core::http_fetcher::StubFetcher;
use pipeline_core::models::{AtsFamily, Company, DelistReason, Job, JobId, RoleFamily};
use pipeline_core::storage::memory::MemoryStorage;
use pipeline_core::storage::Storage;
use std::sync::Arc;

fn thin_job(company_id: pipeline_core::models::CompanyId) -> Job {
    let now = chrono::Utc::now();
    Job {
        id: JobId::new(),
        company_id,
        raw_job_id: None,
        title: "Engineer".to_string(),
        description: None,
        source_url: "https://boards.greenhouse.io/acme/jobs/42".to_string(),
        role_family: RoleFamily::Engineering,
        role_specialization: None,
        seniority: None,
        location_type: None,
        locations: vec![],
        skills: vec![],
        min_salary: None,
        max_salary: None,
        employment_type: None,
        posted_at: None,
        freshness_score: None,
        embedding: None,
        is_active: true,
        last_verified_at: None,
        delisted_at: None,
        delist_reason: None,
        enrich_failed_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn enrichment_404_delists_the_job() {
    let storage = Arc::new(MemoryStorage::new());
    let mut company = Company::new("Acme");
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let job = thin_job(company.id);
    let job_id = storage.upsert_job(job).await.unwrap();

    let stub = Arc::new(StubFetcher::new());
    stub.push_status("https://boards-api.greenhouse.io/v1/boards/acme/jobs/42", 404);

    let engine = EnrichmentEngine::new(stub, storage.clone());
    let outcome = engine.enrich_job_by_id(job_id).await.unwrap();
    assert!(matches!(outcome, EnrichOutcome::Delisted));

    let stored = storage.get_job(job_id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.delist_reason, Some(DelistReason::RemovedFromAts));
    assert!(stored.delisted_at.is_some());
}

#[tokio::test]
async fn enrichment_success_fills_description_and_leaves_job_active() {
    let storage = Arc::new(MemoryStorage::new());
    let mut company = Company::new("Acme");
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let job = thin_job(company.id);
    let job_id = storage.upsert_job(job).await.unwrap();

    let stub = Arc::new(StubFetcher::new());
    let detail = serde_json::json!({
        "id": 42,
        "title": "Engineer",
        "absolute_url": "https://boards.greenhouse.io/acme/jobs/42",
        "location": {"name": "Remote"},
        "departments": null,
        "updated_at": "2024-05-01T00:00:00Z",
        "content": "<p>Build things.</p>"
    });
    stub.push_ok(
        "https://boards-api.greenhouse.io/v1/boards/acme/jobs/42",
        detail.to_string().into_bytes(),
    );

    let engine = EnrichmentEngine::new(stub, storage.clone());
    let outcome = engine.enrich_job_by_id(job_id).await.unwrap();
    assert!(matches!(outcome, EnrichOutcome::Enriched));

    let stored = storage.get_job(job_id).await.unwrap().unwrap();
    assert!(stored.is_active);
    assert_eq!(stored.description.as_deref(), Some("Build things."));
}
