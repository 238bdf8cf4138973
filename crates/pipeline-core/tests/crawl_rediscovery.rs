//! End-to-end: a known Greenhouse identifier starts 404ing (the company
//! moved boards); the Crawl Engine rediscovers the new identifier from
//! the careers page and retries exactly once.

use pipeline_core::crawl::{CrawlEngine, CrawlOutcome};
use pipeline_core::http_fetcher::StubFetcher;
use pipeline_core::models::{AtsFamily, Company};
use pipeline_core::storage::memory::MemoryStorage;
use pipeline_core::storage::Storage;
use std::sync::Arc;

const CAREERS_HTML_NEW_TOKEN: &str = r#"<html><body>
    <div id="grnhse_app" data-board-token="acme-new"></div>
</body></html>"#;

fn jobs_response() -> serde_json::Value {
    serde_json::json!({
        "jobs": [
            {
                "id": 9,
                "title": "Engineer",
                "absolute_url": "https://boards.greenhouse.io/acme-new/jobs/9",
                "location": {"name": "Remote"},
                "departments": null,
                "updated_at": null,
                "content": null
            }
        ]
    })
}

#[tokio::test]
async fn rediscovers_new_identifier_after_a_404_and_retries_once() {
    let storage = Arc::new(MemoryStorage::new());
    let stub = Arc::new(StubFetcher::new());
    stub.push_status("https://boards-api.greenhouse.io/v1/boards/acme-old/jobs", 404);
    stub.push_ok("https://acme.com/careers", CAREERS_HTML_NEW_TOKEN.as_bytes().to_vec());
    stub.push_ok(
        "https://boards-api.greenhouse.io/v1/boards/acme-new/jobs",
        jobs_response().to_string().into_bytes(),
    );

    let mut company = Company::new("Acme");
    company.domain = Some("acme.com".to_string());
    company.careers_url = Some("https://acme.com/careers".to_string());
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme-old".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let engine = CrawlEngine::new(stub, storage.clone(), None, 14.0);
    let outcome = engine.crawl_company(company.id).await.unwrap();
    assert!(matches!(outcome, CrawlOutcome::Updated { jobs_seen: 1 }));

    let stored = storage.get_company(company.id).await.unwrap().unwrap();
    assert_eq!(stored.ats_identifier.as_deref(), Some("acme-new"));
    assert_eq!(
        stored.careers_url.as_deref(),
        Some("https://boards.greenhouse.io/acme-new")
    );

    let jobs = storage.active_jobs_for_company(company.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn rediscovery_that_finds_the_same_identifier_gives_up() {
    let storage = Arc::new(MemoryStorage::new());
    let stub = Arc::new(StubFetcher::new());
    stub.push_status("https://boards-api.greenhouse.io/v1/boards/acme/jobs", 404);
    stub.push_ok(
        "https://acme.com/careers",
        r#"<div data-board-token="acme"></div>"#.as_bytes().to_vec(),
    );

    let mut company = Company::new("Acme");
    company.domain = Some("acme.com".to_string());
    company.careers_url = Some("https://acme.com/careers".to_string());
    company.ats_family = Some(AtsFamily::Greenhouse);
    company.ats_identifier = Some("acme".to_string());
    let company = storage.insert_company(company).await.unwrap();

    let engine = CrawlEngine::new(stub, storage.clone(), None, 14.0);
    let result = engine.crawl_company(company.id).await;
    assert!(result.is_err());
}
