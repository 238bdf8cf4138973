//! Crawl Engine. Instantiated per-company; bulk crawl bounds
//! concurrency with a semaphore over per-task storage calls.

use crate::ats::detector::Detector;
use crate::ats::registry;
use crate::error::{CrawlError, CrawlFailureReason};
use crate::extractors::{self, llm::LlmExtractor};
use crate::html_utils;
use crate::http_fetcher::{Fetcher, FetchOutcome, Renderer};
use crate::models::{AtsFamily, Company, ContentHash, CrawlSnapshot, CrawlSnapshotId, JobRaw, JobRawId};
use crate::normalizer;
use crate::storage::Storage;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub enum CrawlOutcome {
    Unchanged,
    Updated { jobs_seen: usize },
}

pub struct CrawlEngine {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn Storage>,
    llm: Option<Arc<LlmExtractor>>,
    renderer: Option<Arc<dyn Renderer>>,
    freshness_half_life_days: f64,
}

impl CrawlEngine {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn Storage>,
        llm: Option<Arc<LlmExtractor>>,
        freshness_half_life_days: f64,
    ) -> Self {
        Self {
            fetcher,
            storage,
            llm,
            renderer: None,
            freshness_half_life_days,
        }
    }

    /// Attaches the JS-rendering path for `AtsFamily::Custom` companies
    /// (spec.md §1's headless-browser pool, consumed only through this
    /// `render(url) -> HTML` trait boundary). Without one, `Custom`
    /// companies fall back to the plain `Fetcher`, same as before this
    /// was wired in.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Fetch, dedupe-by-hash, extract, and store one company's job
    /// listing, rediscovering the careers URL once on a 404 before
    /// giving up.
    pub async fn crawl_company(&self, company_id: crate::models::CompanyId) -> Result<CrawlOutcome, CrawlError> {
        let mut company = self
            .storage
            .get_company(company_id)
            .await?
            .ok_or(CrawlError::NoCareersUrl)?;

        if !company.is_active || company.careers_url.is_none() {
            return Err(CrawlError::NoCareersUrl);
        }

        if company.ats_family.is_none() {
            self.detect_and_persist(&mut company).await?;
        }

        let fetch_url = self.fetch_url_for(&company);
        let family = company.ats_family.unwrap_or(AtsFamily::Custom);
        let outcome = self.fetch_for_family(&fetch_url, family).await;

        let (outcome, rendered) = match outcome {
            Ok((outcome, _)) if outcome.status == 404 && company.ats_identifier.is_some() => {
                warn!(company_id = %company.id, url = fetch_url, "404 fetching known ATS identifier; attempting rediscovery");
                match self.rediscover_and_retry(&mut company).await {
                    Some(pair) => pair,
                    None => return Err(CrawlError::FetchFailedAfterRediscovery),
                }
            }
            Ok((outcome, _)) if outcome.status >= 400 => {
                return Err(CrawlError::Fetch(crate::error::FetchError::Status {
                    url: fetch_url,
                    status: outcome.status,
                }));
            }
            Ok(pair) => pair,
            Err(e) => return Err(e),
        };

        let Some(body) = outcome.body else {
            return Err(CrawlError::Fetch(crate::error::FetchError::Status {
                url: fetch_url,
                status: outcome.status,
            }));
        };

        let body_text = String::from_utf8_lossy(&body).into_owned();
        let hash = ContentHash::from_content(&body_text);

        let previous = self.storage.latest_snapshot(company.id).await?;
        if previous.as_ref().map(|s| &s.html_hash) == Some(&hash) {
            company.last_crawled_at = Some(chrono::Utc::now());
            self.storage.update_company(&company).await?;
            return Ok(CrawlOutcome::Unchanged);
        }

        let snapshot = CrawlSnapshot {
            id: CrawlSnapshotId::new(),
            company_id: company.id,
            url: outcome.final_url.clone(),
            html_hash: hash,
            html_content: Some(body_text),
            status_code: Some(outcome.status),
            rendered,
            crawled_at: chrono::Utc::now(),
        };
        self.storage.insert_snapshot(snapshot).await?;

        let family = company.ats_family.unwrap_or(AtsFamily::Custom);
        let extractor = extractors::extractor_for(family, self.llm.clone());
        let extracted = extractor
            .extract(&body, &outcome.final_url, company.ats_identifier.as_deref())
            .await?;

        let jobs_seen = extracted.len();
        for job in extracted {
            self.upsert_extracted_job(&company, job).await?;
        }

        company.last_crawled_at = Some(chrono::Utc::now());
        self.storage.update_company(&company).await?;

        info!(company_id = %company.id, jobs_seen, "crawl completed");
        Ok(CrawlOutcome::Updated { jobs_seen })
    }

    async fn detect_and_persist(&self, company: &mut Company) -> Result<(), CrawlError> {
        let Some(careers_url) = company.careers_url.clone() else {
            return Err(CrawlError::NoCareersUrl);
        };
        let detector = Detector::new(&self.fetcher);
        match detector
            .detect_from_careers_url(&careers_url, company.domain.as_deref())
            .await
        {
            Ok(result) => {
                company.ats_family = Some(result.family);
                company.ats_identifier = result.identifier;
                company.ats_detection_attempts += 1;
                company.ats_detection_last_at = Some(chrono::Utc::now());
                self.storage.update_company(company).await?;
            }
            Err(_) => {
                company.ats_detection_attempts += 1;
                company.ats_detection_last_at = Some(chrono::Utc::now());
                self.storage.update_company(company).await?;
            }
        }
        Ok(())
    }

    fn fetch_url_for(&self, company: &Company) -> String {
        if let (Some(family), Some(identifier)) = (company.ats_family, company.ats_identifier.as_deref()) {
            if !registry::is_blocklisted(identifier) {
                if let Some(entry) = registry::entry_for(family) {
                    if let Some(api_url) = entry.api_list_url_for(identifier) {
                        return api_url;
                    }
                }
            }
        }
        company.careers_url.clone().unwrap_or_default()
    }

    /// Re-parses the careers page for a new identifier; if different,
    /// updates `ats_identifier`/`careers_url` and retries exactly once.
    async fn rediscover_and_retry(&self, company: &mut Company) -> Option<(FetchOutcome, bool)> {
        let careers_url = company.careers_url.clone()?;
        let detector = Detector::new(&self.fetcher);
        let result = detector
            .detect_from_careers_url(&careers_url, company.domain.as_deref())
            .await
            .ok()?;

        if result.identifier.as_deref() == company.ats_identifier.as_deref() {
            return None;
        }

        company.ats_family = Some(result.family);
        company.ats_identifier = result.identifier.clone();
        if let (Some(entry), Some(identifier)) = (registry::entry_for(result.family), result.identifier.as_deref()) {
            company.careers_url = Some(entry.careers_url_for(identifier));
        }
        self.storage.update_company(company).await.ok()?;

        let retry_url = self.fetch_url_for(company);
        let family = company.ats_family.unwrap_or(AtsFamily::Custom);
        self.fetch_for_family(&retry_url, family).await.ok()
    }

    /// Dispatches to the JS-render path for `AtsFamily::Custom` companies
    /// when a `Renderer` is configured; everything else (and a `Custom`
    /// company when no renderer was attached) goes through the plain
    /// `Fetcher`. Returns whether the render path was used so the caller
    /// can stamp `CrawlSnapshot.rendered` accurately.
    async fn fetch_for_family(&self, url: &str, family: AtsFamily) -> Result<(FetchOutcome, bool), CrawlError> {
        if family == AtsFamily::Custom {
            if let Some(renderer) = &self.renderer {
                let outcome = renderer.render(url).await?;
                return Ok((outcome, true));
            }
        }
        let outcome = self.fetcher.fetch(url).await?;
        Ok((outcome, false))
    }

    async fn upsert_extracted_job(
        &self,
        company: &Company,
        extracted: extractors::ExtractedJob,
    ) -> Result<(), CrawlError> {
        let source_url = html_utils::normalize_source_url(&extracted.source_url);
        let raw = JobRaw {
            id: JobRawId::new(),
            company_id: company.id,
            source_url: source_url.clone(),
            title_raw: extracted.title,
            description_raw: extracted.description,
            location_raw: extracted.location,
            department_raw: extracted.department,
            employment_type_raw: extracted.employment_type,
            posted_at_raw: extracted.posted_at,
            salary_raw: extracted.salary,
            extracted_at: chrono::Utc::now(),
        };
        let raw_id = self.storage.upsert_job_raw(raw.clone()).await?;
        let mut raw = raw;
        raw.id = raw_id;

        let existing = self
            .storage
            .get_job_by_source_url(company.id, &source_url)
            .await?;
        let job = normalizer::normalize(&raw, existing.as_ref(), self.freshness_half_life_days);
        self.storage.upsert_job(job).await?;
        Ok(())
    }
}

/// Bulk crawl over a batch of companies, bounded by `concurrency`.
pub async fn crawl_companies(
    engine: Arc<CrawlEngine>,
    company_ids: Vec<crate::models::CompanyId>,
    concurrency: usize,
) -> Vec<(crate::models::CompanyId, Result<CrawlOutcome, CrawlError>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();
    for company_id in company_ids {
        let engine = engine.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result = engine.crawl_company(company_id).await;
            (company_id, result)
        }));
    }
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(pair) = handle.await {
            results.push(pair);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_fetcher::HttpFetcher;
    use crate::models::CompanyId;
    use crate::storage::memory::MemoryStorage;

    fn test_engine(storage: Arc<MemoryStorage>) -> CrawlEngine {
        let rate_limiter = Arc::new(crate::rate_limiter::RateLimiter::new(Default::default()));
        let fetcher = Arc::new(HttpFetcher::new(
            "test-agent",
            std::time::Duration::from_secs(5),
            rate_limiter,
        ));
        CrawlEngine::new(fetcher, storage, None, 14.0)
    }

    #[tokio::test]
    async fn crawl_rejects_company_without_careers_url() {
        let storage = Arc::new(MemoryStorage::new());
        let company = Company::new("Acme");
        let company = storage.insert_company(company).await.unwrap();
        let engine = test_engine(storage);
        let result = engine.crawl_company(company.id).await;
        assert!(matches!(result, Err(CrawlError::NoCareersUrl)));
    }

    #[tokio::test]
    async fn crawl_rejects_unknown_company() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = test_engine(storage);
        let result = engine.crawl_company(CompanyId::new()).await;
        assert!(matches!(result, Err(CrawlError::NoCareersUrl)));
    }

    #[test]
    fn fetch_url_prefers_api_when_identifier_known() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = test_engine(storage);
        let mut company = Company::new("Acme");
        company.ats_family = Some(AtsFamily::Greenhouse);
        company.ats_identifier = Some("acme".to_string());
        company.careers_url = Some("https://acme.com/careers".to_string());
        let url = engine.fetch_url_for(&company);
        assert_eq!(url, "https://boards-api.greenhouse.io/v1/boards/acme/jobs");
    }

    #[test]
    fn fetch_url_falls_back_to_careers_url_without_identifier() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = test_engine(storage);
        let mut company = Company::new("Acme");
        company.careers_url = Some("https://acme.com/careers".to_string());
        let url = engine.fetch_url_for(&company);
        assert_eq!(url, "https://acme.com/careers");
    }

    /// A `Custom`-family company (no dedicated ATS, so spec.md's
    /// JS-rendering path applies) must be crawled through the attached
    /// `Renderer` rather than the plain `Fetcher`, and the resulting
    /// snapshot must record that.
    #[tokio::test]
    async fn custom_family_company_is_crawled_via_renderer() {
        use crate::http_fetcher::{StubFetcher, StubRenderer};

        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        let renderer = Arc::new(StubRenderer::new());
        renderer.push_ok(
            "https://acme.com/careers",
            b"<html><body><a href=\"https://acme.com/careers/1\">Engineer</a></body></html>".to_vec(),
        );
        let engine = CrawlEngine::new(fetcher, storage.clone(), None, 14.0).with_renderer(renderer);

        let mut company = Company::new("Acme");
        company.ats_family = Some(AtsFamily::Custom);
        company.careers_url = Some("https://acme.com/careers".to_string());
        let company = storage.insert_company(company).await.unwrap();

        let result = engine.crawl_company(company.id).await.unwrap();
        assert!(matches!(result, CrawlOutcome::Updated { .. }));

        let snapshot = storage.latest_snapshot(company.id).await.unwrap().unwrap();
        assert!(snapshot.rendered);
    }

    /// Without an attached `Renderer`, a `Custom`-family company still
    /// falls back to the plain `Fetcher` rather than erroring out.
    #[tokio::test]
    async fn custom_family_company_falls_back_to_fetcher_without_renderer() {
        use crate::http_fetcher::StubFetcher;

        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.push_ok("https://acme.com/careers", b"<html><body>no jobs here</body></html>".to_vec());
        let engine = CrawlEngine::new(fetcher, storage.clone(), None, 14.0);

        let mut company = Company::new("Acme");
        company.ats_family = Some(AtsFamily::Custom);
        company.careers_url = Some("https://acme.com/careers".to_string());
        let company = storage.insert_company(company).await.unwrap();

        engine.crawl_company(company.id).await.unwrap();

        let snapshot = storage.latest_snapshot(company.id).await.unwrap().unwrap();
        assert!(!snapshot.rendered);
    }
}
