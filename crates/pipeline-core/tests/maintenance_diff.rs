//! End-to-end: the Maintenance Engine re-fetches a company's live
//! listing and diffs it against stored active jobs; re-running against
//! the same listing must be idempotent.

use pipeline_core::http_fetcher::StubFetcher;
use pipeline_core::maintenance::{MaintenanceEngine, MaintenanceOutcome};
use pipeline_core::models::{AtsFamily, Company, DelistReason, Job, JobId, RoleFamily};
use pipeline_core::storage::memory::MemoryStorage;
use pipeline_core::storage::Storage;
use std::sync::Arc;

fn job(company_id: pipeline_core::models::CompanyId, title: &str, source_url: &str) -> Job {
    let now = chrono::Utc::now();
    Job {
        id: JobId::new(),
        company_id,
        raw_job_id: None,
        title: title.to_string(),
        description: None,
        source_url: source_url.to_string(),
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

fn listing_with_only_still_posted() -> serde_json::Value {
    serde_json::json!({
        "jobs": [
            {
                "id": 1,
                "title": "SWE",
                "absolute_url": "https://boards.greenhouse.io/acme/jobs/1",
                "location": null,
                "departments": null,
                "updated_at": null,
                "content": null
            }
        ]
    })
}

#[tokio::test]
async fn maintenance_delists_missing_and_rerun_is_idempotent() {
    let storage = Arc::new(MemoryStorage::new());
    let mut company = Company::new("Acme");
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let still_posted = job(company.id, "SWE", "https://boards.greenhouse.io/acme/jobs/1");
    let removed = job(company.id, "PM", "https://boards.greenhouse.io/acme/jobs/2");
    storage.upsert_job(still_posted.clone()).await.unwrap();
    storage.upsert_job(removed.clone()).await.unwrap();

    let stub = Arc::new(StubFetcher::new());
    let jobs_url = "https://boards-api.greenhouse.io/v1/boards/acme/jobs";
    stub.push_ok(jobs_url, listing_with_only_still_posted().to_string().into_bytes());
    stub.push_ok(jobs_url, listing_with_only_still_posted().to_string().into_bytes());

    let engine = MaintenanceEngine::new(stub, storage.clone(), None, 14.0);

    let first = engine.maintain_company(company.id).await.unwrap();
    match first {
        MaintenanceOutcome::Updated { delisted, new, verified } => {
            assert_eq!((delisted, new, verified), (1, 0, 1));
        }
        _ => panic!("expected Updated"),
    }
    let removed_after_first = storage.get_job(removed.id).await.unwrap().unwrap();
    assert!(!removed_after_first.is_active);
    assert_eq!(removed_after_first.delist_reason, Some(DelistReason::RemovedFromAts));

    let second = engine.maintain_company(company.id).await.unwrap();
    match second {
        MaintenanceOutcome::Updated { delisted, new, verified } => {
            assert_eq!((delisted, new, verified), (0, 0, 1));
        }
        _ => panic!("expected Updated"),
    }
    let removed_after_second = storage.get_job(removed.id).await.unwrap().unwrap();
    assert!(!removed_after_second.is_active);
}

#[tokio::test]
async fn empty_extraction_is_treated_as_unknown_not_zero_postings() {
    let storage = Arc::new(MemoryStorage::new());
    let mut company = Company::new("Acme");
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let still_posted = job(company.id, "SWE", "https://boards.greenhouse.io/acme/jobs/1");
    storage.upsert_job(still_posted.clone()).await.unwrap();

    let stub = Arc::new(StubFetcher::new());
    stub.push_ok(
        "https://boards-api.greenhouse.io/v1/boards/acme/jobs",
        serde_json::json!({"jobs": []}).to_string().into_bytes(),
    );

    let engine = MaintenanceEngine::new(stub, storage.clone(), None, 14.0);
    let outcome = engine.maintain_company(company.id).await.unwrap();
    assert!(matches!(outcome, MaintenanceOutcome::Unknown));

    let untouched = storage.get_job(still_posted.id).await.unwrap().unwrap();
    assert!(untouched.is_active);
}
