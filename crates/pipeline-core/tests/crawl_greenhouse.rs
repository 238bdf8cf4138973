//! End-to-end: detect a Greenhouse board from a careers page, then crawl
//! its job list through the same `CrawlEngine` a production run would use,
//! using a scripted `StubFetcher` in place of real network calls.

use pipeline_core::crawl::{CrawlEngine, CrawlOutcome};
use pipeline_core::http_fetcher::StubFetcher;
use pipeline_core::models::{AtsFamily, Company, LocationType};
use pipeline_core::storage::memory::MemoryStorage;
use pipeline_core::storage::Storage;
use std::sync::Arc;

const CAREERS_HTML: &str = r#"<html><body>
    <h1>Careers at Acme</h1>
    <div id="grnhse_app" data-board-token="acme"></div>
</body></html>"#;

fn greenhouse_jobs_response() -> serde_json::Value {
    serde_json::json!({
        "jobs": [
            {
                "id": 1,
                "title": "SWE",
                "absolute_url": "https://boards.greenhouse.io/acme/jobs/1",
                "location": {"name": "Remote"},
                "departments": [{"name": "Engineering"}],
                "updated_at": "2024-01-01T00:00:00Z",
                "content": null
            },
            {
                "id": 2,
                "title": "PM",
                "absolute_url": "https://boards.greenhouse.io/acme/jobs/2",
                "location": {"name": "New York, NY"},
                "departments": null,
                "updated_at": null,
                "content": null
            }
        ]
    });
}

#[tokio::test]
async fn detects_and_crawls_a_greenhouse_board() {
    let storage = Arc::new(MemoryStorage::new());
    let stub = Arc::new(StubFetcher::new());
    stub.push_ok("https://acme.com/careers", CAREERS_HTML.as_bytes().to_vec());
    stub.push_ok(
        "https://boards-api.greenhouse.io/v1/boards/acme/jobs",
        greenhouse_jobs_response().to_string().into_bytes(),
    );

    let mut company = Company::new("Acme");
    company.careers_url = Some("https://acme.com/careers".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let engine = CrawlEngine::new(stub, storage.clone(), None, 14.0);
    let outcome = engine.crawl_company(company.id).await.unwrap();
    assert!(matches!(outcome, CrawlOutcome::Updated { jobs_seen: 2 }));

    let stored = storage.get_company(company.id).await.unwrap().unwrap();
    assert_eq!(stored.ats_family, Some(AtsFamily::Greenhouse));
    assert_eq!(stored.ats_identifier.as_deref(), Some("acme"));

    let snapshot = storage.latest_snapshot(company.id).await.unwrap();
    assert!(snapshot.is_some());

    let jobs = storage.active_jobs_for_company(company.id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    let swe = jobs.iter().find(|j| j.title == "SWE").unwrap();
    assert_eq!(swe.location_type, Some(LocationType::Remote));
}

#[tokio::test]
async fn recrawl_with_unchanged_html_is_a_noop() {
    let storage = Arc::new(MemoryStorage::new());
    let stub = Arc::new(StubFetcher::new());
    let jobs_url = "https://boards-api.greenhouse.io/v1/boards/acme/jobs";
    stub.push_ok(jobs_url, greenhouse_jobs_response().to_string().into_bytes());
    stub.push_ok(jobs_url, greenhouse_jobs_response().to_string().into_bytes());

    let mut company = Company::new("Acme");
    company.careers_url = Some("https://acme.com/careers".to_string());
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let engine = CrawlEngine::new(stub, storage.clone(), None, 14.0);
    let first = engine.crawl_company(company.id).await.unwrap();
    assert!(matches!(first, CrawlOutcome::Updated { .. }));

    let second = engine.crawl_company(company.id).await.unwrap();
    assert!(matches!(second, CrawlOutcome::Unchanged));
}
