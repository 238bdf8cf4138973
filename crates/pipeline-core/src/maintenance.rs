//! Maintenance Engine. Re-fetches a company's current
//! listing and diffs it against the active `Job` rows already stored:
//! postings no longer present are delisted, postings not seen before
//! are inserted, and postings present in both just get their
//! `last_verified_at` bumped. Custom-family companies (no dedicated
//! extractor, hence no stable per-posting URL scheme) fall back to
//! matching on normalized title when a URL match fails.

use crate::ats::registry;
use crate::error::MaintainError;
use crate::extractors::{self, llm::LlmExtractor, ExtractedJob};
use crate::html_utils;
use crate::http_fetcher::{FetchOutcome, Fetcher, Renderer};
use crate::models::{AtsFamily, Company, CompanyId, DelistReason, Job, JobRaw, JobRawId};
use crate::normalizer;
use crate::storage::Storage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub enum MaintenanceOutcome {
    Updated { delisted: usize, new: usize, verified: usize },
    /// The extractor came back with nothing at all — read as "could not
    /// determine the current set", never as "zero postings",
    /// so nothing is delisted; only `last_maintenance_at` advances.
    Unknown,
    Skipped,
}

pub struct MaintenanceEngine {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn Storage>,
    llm: Option<Arc<LlmExtractor>>,
    renderer: Option<Arc<dyn Renderer>>,
    freshness_half_life_days: f64,
}

impl MaintenanceEngine {
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

    /// Attaches the JS-rendering path used for `AtsFamily::Custom`
    /// companies during the current-listing re-fetch, mirroring
    /// `CrawlEngine::with_renderer`.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub async fn maintain_company(&self, company_id: CompanyId) -> Result<MaintenanceOutcome, MaintainError> {
        let mut company = match self.storage.get_company(company_id).await? {
            Some(company) if company.is_active && company.ats_family.is_some() => company,
            _ => return Ok(MaintenanceOutcome::Skipped),
        };

        let fetch_url = self.fetch_url_for(&company);
        if fetch_url.is_empty() {
            return Ok(MaintenanceOutcome::Skipped);
        }

        let family = company.ats_family.unwrap_or(AtsFamily::Custom);
        let outcome = self.fetch_for_family(&fetch_url, family).await?;
        let Some(body) = outcome.body else {
            return Err(MaintainError::Fetch(crate::error::FetchError::Status {
                url: fetch_url,
                status: outcome.status,
            }));
        };

        let extractor = extractors::extractor_for(family, self.llm.clone());
        let current = extractor
            .extract(&body, &outcome.final_url, company.ats_identifier.as_deref())
            .await?;

        if current.is_empty() {
            company.last_maintenance_at = Some(chrono::Utc::now());
            self.storage.update_company(&company).await?;
            warn!(company_id = %company.id, "maintenance extractor returned no postings; leaving existing jobs untouched");
            return Ok(MaintenanceOutcome::Unknown);
        }

        let existing = self.storage.active_jobs_for_company(company.id).await?;
        let use_title_matching = !family.has_dedicated_extractor();
        let (delisted, new, verified) = self
            .diff_and_apply(&company, existing, current, use_title_matching)
            .await?;

        company.last_maintenance_at = Some(chrono::Utc::now());
        self.storage.update_company(&company).await?;

        info!(company_id = %company.id, delisted, new, verified, "maintenance completed");
        Ok(MaintenanceOutcome::Updated { delisted, new, verified })
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

    /// Dispatches to the JS-render path for `AtsFamily::Custom` companies
    /// when a `Renderer` is attached; otherwise falls back to the plain
    /// `Fetcher`, mirroring `CrawlEngine::fetch_for_family`.
    async fn fetch_for_family(&self, url: &str, family: AtsFamily) -> Result<FetchOutcome, MaintainError> {
        if family == AtsFamily::Custom {
            if let Some(renderer) = &self.renderer {
                return Ok(renderer.render(url).await?);
            }
        }
        Ok(self.fetcher.fetch(url).await?)
    }

    async fn diff_and_apply(
        &self,
        company: &Company,
        existing: Vec<Job>,
        current: Vec<ExtractedJob>,
        use_title_matching: bool,
    ) -> Result<(usize, usize, usize), MaintainError> {
        let mut existing_by_url: HashMap<String, Job> = existing
            .iter()
            .map(|j| (html_utils::normalize_source_url(&j.source_url), j.clone()))
            .collect();
        let existing_by_title: HashMap<String, Job> = existing
            .iter()
            .map(|j| (normalize_title(&j.title), j.clone()))
            .collect();

        let mut matched_existing: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut new_count = 0usize;
        let mut verified_count = 0usize;

        for item in current {
            let normalized_url = html_utils::normalize_source_url(&item.source_url);
            let matched = existing_by_url.get(&normalized_url).cloned().or_else(|| {
                if use_title_matching {
                    existing_by_title.get(&normalize_title(&item.title)).cloned()
                } else {
                    None
                }
            });

            match matched {
                Some(mut job) => {
                    matched_existing.insert(html_utils::normalize_source_url(&job.source_url));
                    job.last_verified_at = Some(chrono::Utc::now());
                    job.updated_at = chrono::Utc::now();
                    self.storage.update_job(&job).await?;
                    verified_count += 1;
                }
                None => {
                    self.insert_new_posting(company, item).await?;
                    new_count += 1;
                }
            }
        }

        let mut delisted_count = 0usize;
        for (normalized_url, mut job) in existing_by_url.drain() {
            if matched_existing.contains(&normalized_url) {
                continue;
            }
            job.delist(DelistReason::RemovedFromAts);
            self.storage.update_job(&job).await?;
            delisted_count += 1;
        }

        Ok((delisted_count, new_count, verified_count))
    }

    async fn insert_new_posting(&self, company: &Company, extracted: ExtractedJob) -> Result<(), MaintainError> {
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

        let existing = self.storage.get_job_by_source_url(company.id, &source_url).await?;
        let job = normalizer::normalize(&raw, existing.as_ref(), self.freshness_half_life_days);
        self.storage.upsert_job(job).await?;
        Ok(())
    }
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Bulk maintenance over a batch of companies, bounded by `concurrency`,
/// mirroring `crawl::crawl_companies`.
pub async fn maintain_companies(
    engine: Arc<MaintenanceEngine>,
    company_ids: Vec<CompanyId>,
    concurrency: usize,
) -> Vec<(CompanyId, Result<MaintenanceOutcome, MaintainError>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();
    for company_id in company_ids {
        let engine = engine.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result = engine.maintain_company(company_id).await;
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
    use crate::models::{JobId, RoleFamily};
    use crate::rate_limiter::RateLimiter;
    use crate::storage::memory::MemoryStorage;

    fn test_engine(storage: Arc<MemoryStorage>) -> MaintenanceEngine {
        let rate_limiter = Arc::new(RateLimiter::new(Default::default()));
        let fetcher = Arc::new(HttpFetcher::new(
            "test-agent",
            std::time::Duration::from_secs(5),
            rate_limiter,
        ));
        MaintenanceEngine::new(fetcher, storage, None, 14.0)
    }

    fn test_job(company_id: CompanyId, title: &str, source_url: &str) -> Job {
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

    #[tokio::test]
    async fn maintenance_skips_company_without_ats_family() {
        let storage = Arc::new(MemoryStorage::new());
        let company = Company::new("Acme");
        let company = storage.insert_company(company).await.unwrap();
        let engine = test_engine(storage);
        let result = engine.maintain_company(company.id).await.unwrap();
        assert!(matches!(result, MaintenanceOutcome::Skipped));
    }

    #[tokio::test]
    async fn diff_delists_missing_and_verifies_present_urls() {
        let storage = Arc::new(MemoryStorage::new());
        let mut company = Company::new("Acme");
        company.ats_family = Some(AtsFamily::Greenhouse);
        company.ats_identifier = Some("acme".to_string());
        let company = storage.insert_company(company).await.unwrap();

        let still_posted = test_job(company.id, "SWE", "https://boards.greenhouse.io/acme/jobs/1");
        let removed = test_job(company.id, "PM", "https://boards.greenhouse.io/acme/jobs/2");
        storage.upsert_job(still_posted.clone()).await.unwrap();
        storage.upsert_job(removed.clone()).await.unwrap();

        let engine = test_engine(storage.clone());
        let mut current_item = ExtractedJob::new("SWE", "https://boards.greenhouse.io/acme/jobs/1");
        current_item.description = Some("Build things.".into());
        let (delisted, new, verified) = engine
            .diff_and_apply(&company, vec![still_posted, removed.clone()], vec![current_item], false)
            .await
            .unwrap();
        assert_eq!((delisted, new, verified), (1, 0, 1));

        let stored_removed = storage.get_job(removed.id).await.unwrap().unwrap();
        assert!(!stored_removed.is_active);
        assert_eq!(stored_removed.delist_reason, Some(DelistReason::RemovedFromAts));
    }

    #[tokio::test]
    async fn title_matching_fallback_verifies_job_whose_url_changed() {
        let storage = Arc::new(MemoryStorage::new());
        let mut company = Company::new("Acme");
        company.ats_family = Some(AtsFamily::Custom);
        let company = storage.insert_company(company).await.unwrap();

        let existing_job = test_job(company.id, "Staff Engineer", "https://acme.com/careers/old-path");
        storage.upsert_job(existing_job.clone()).await.unwrap();

        let engine = test_engine(storage.clone());
        let current_item = ExtractedJob::new("Staff Engineer", "https://acme.com/careers/new-path");
        let (delisted, new, verified) = engine
            .diff_and_apply(&company, vec![existing_job], vec![current_item], true)
            .await
            .unwrap();
        assert_eq!((delisted, new, verified), (0, 0, 1));
    }

    #[test]
    fn normalize_title_collapses_whitespace_and_case() {
        assert_eq!(normalize_title("  Senior   SWE  "), "senior swe");
        assert_eq!(normalize_title("Senior SWE"), "senior swe");
    }

    /// A `Custom`-family company's current-listing re-fetch goes through
    /// the attached `Renderer`, not the plain `Fetcher`.
    #[tokio::test]
    async fn custom_family_maintenance_uses_renderer_when_attached() {
        use crate::http_fetcher::{StubFetcher, StubRenderer};

        let storage = Arc::new(MemoryStorage::new());
        let mut company = Company::new("Acme");
        company.ats_family = Some(AtsFamily::Custom);
        company.careers_url = Some("https://acme.com/careers".to_string());
        let company = storage.insert_company(company).await.unwrap();

        let fetcher = Arc::new(StubFetcher::new());
        let renderer = Arc::new(StubRenderer::new());
        renderer.push_ok(
            "https://acme.com/careers",
            b"<html><body><a href=\"https://acme.com/careers/1\">Staff Engineer</a></body></html>".to_vec(),
        );
        let engine = MaintenanceEngine::new(fetcher, storage.clone(), None, 14.0).with_renderer(renderer);

        let result = engine.maintain_company(company.id).await.unwrap();
        assert!(matches!(result, MaintenanceOutcome::Updated { .. }));
    }
}
