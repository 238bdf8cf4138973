//! Enrichment Engine. Fills in `description`/`posted_at` for
//! jobs the Crawl Engine's list endpoint left thin, using each family's
//! own detail shape where one exists and the generic HTML/JSON-LD path
//! otherwise. A 404 from a family's detail endpoint means the posting
//! was pulled between crawl and enrichment — that delists the job, it
//! is never surfaced as an error.

use crate::ats::registry;
use crate::error::{EnrichError, FetchError};
use crate::extractors::{ashby, ashby::AshbyExtractor, greenhouse, jsonld, lever::LeverExtractor, workable, workable::WorkableExtractor, ExtractedJob, Extractor};
use crate::html_utils::{self, ResponseBody};
use crate::http_fetcher::Fetcher;
use crate::models::{AtsFamily, DelistReason, Job, JobId};
use crate::normalizer;
use crate::storage::Storage;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

lazy_static! {
    static ref GREENHOUSE_JOB_ID: Regex = Regex::new(r"(?:jobs/|careers/|gh_jid=)(\d+)").unwrap();
    static ref ASHBY_JOB_ID: Regex =
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").unwrap();
    static ref DESCRIPTION_SELECTORS: Vec<Regex> = vec![
        description_class_regex("job-description"),
        description_class_regex("posting-description"),
        description_class_regex("description"),
        Regex::new(r"(?s)<article[^>]*>(.*?)</article>").unwrap(),
    ];
    static ref DATE_POSTED_RE: Regex = Regex::new(r#"(?i)"datePosted"\s*:\s*"([^"]+)""#).unwrap();
}

fn description_class_regex(class_name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?s)<div[^>]*class=["'][^"']*{}[^"']*["'][^>]*>(.*?)</div>"#,
        regex::escape(class_name)
    ))
    .unwrap()
}

pub enum EnrichOutcome {
    Enriched,
    Delisted,
    /// Fetched successfully but no description path matched; job is
    /// left untouched rather than delisted on a guess.
    NoPath,
}

/// Intermediate result of a single family-specific fetch attempt.
enum FetchAttempt {
    Found(ExtractedJob),
    Delisted,
    NothingFound,
}

pub struct EnrichmentEngine {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn Storage>,
}

impl EnrichmentEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, storage: Arc<dyn Storage>) -> Self {
        Self { fetcher, storage }
    }

    pub async fn enrich_job_by_id(&self, job_id: JobId) -> Result<EnrichOutcome, EnrichError> {
        let job = self
            .storage
            .get_job(job_id)
            .await?
            .ok_or(EnrichError::NoPath)?;
        let company = self
            .storage
            .get_company(job.company_id)
            .await?
            .ok_or(EnrichError::NoPath)?;
        let family = company.ats_family.unwrap_or(AtsFamily::Custom);
        self.enrich_job(job, family, company.ats_identifier.as_deref()).await
    }

    pub async fn enrich_job(
        &self,
        mut job: Job,
        family: AtsFamily,
        identifier: Option<&str>,
    ) -> Result<EnrichOutcome, EnrichError> {
        let attempt = match family {
            AtsFamily::Greenhouse => self.enrich_greenhouse(&job, identifier).await?,
            AtsFamily::Lever => self.enrich_lever(&job).await?,
            AtsFamily::Ashby => self.enrich_ashby(&job, identifier).await?,
            AtsFamily::Workable => self.enrich_workable(&job, identifier).await?,
            _ => self.enrich_generic(&job).await?,
        };

        match attempt {
            FetchAttempt::Found(extracted) => {
                apply_enrichment(&mut job, extracted);
                self.storage.update_job(&job).await?;
                info!(job_id = %job.id, %family, "enrichment completed");
                Ok(EnrichOutcome::Enriched)
            }
            FetchAttempt::Delisted => {
                job.delist(DelistReason::RemovedFromAts);
                self.storage.update_job(&job).await?;
                warn!(job_id = %job.id, %family, "job missing on enrichment fetch, delisted");
                Ok(EnrichOutcome::Delisted)
            }
            FetchAttempt::NothingFound => {
                job.enrich_failed_at = Some(chrono::Utc::now());
                self.storage.update_job(&job).await?;
                debug!(job_id = %job.id, %family, "no enrichment path matched");
                Ok(EnrichOutcome::NoPath)
            }
        }
    }

    async fn enrich_greenhouse(&self, job: &Job, identifier: Option<&str>) -> Result<FetchAttempt, EnrichError> {
        let (Some(identifier), Some(job_id)) = (identifier, greenhouse_job_id(&job.source_url)) else {
            return Ok(FetchAttempt::NothingFound);
        };
        let Some(entry) = registry::entry_for(AtsFamily::Greenhouse) else {
            return Ok(FetchAttempt::NothingFound);
        };
        let Some(url) = entry.api_detail_url_for(identifier, &job_id) else {
            return Ok(FetchAttempt::NothingFound);
        };

        let outcome = self.fetcher.fetch(&url).await?;
        if outcome.status == 404 {
            return Ok(FetchAttempt::Delisted);
        }
        let Some(body) = outcome.body else {
            return Err(EnrichError::Fetch(FetchError::Status { url, status: outcome.status }));
        };
        match greenhouse::parse_job_detail(&body) {
            Ok(extracted) => Ok(FetchAttempt::Found(extracted)),
            Err(_) => Ok(FetchAttempt::NothingFound),
        }
    }

    /// Lever has no stable job-id detail endpoint; re-fetches the
    /// posting page itself and reuses the Lever extractor's own
    /// JSON-LD-then-`.posting-description` fallback chain.
    async fn enrich_lever(&self, job: &Job) -> Result<FetchAttempt, EnrichError> {
        let outcome = self.fetcher.fetch(&job.source_url).await?;
        if outcome.status == 404 {
            return Ok(FetchAttempt::Delisted);
        }
        let Some(body) = outcome.body else {
            return Err(EnrichError::Fetch(FetchError::Status {
                url: job.source_url.clone(),
                status: outcome.status,
            }));
        };
        match LeverExtractor.extract(&body, &outcome.final_url, None).await {
            Ok(jobs) => Ok(jobs.into_iter().next().map(FetchAttempt::Found).unwrap_or(FetchAttempt::NothingFound)),
            Err(_) => Ok(FetchAttempt::NothingFound),
        }
    }

    async fn enrich_ashby(&self, job: &Job, identifier: Option<&str>) -> Result<FetchAttempt, EnrichError> {
        let (Some(identifier), Some(job_id)) = (identifier, ashby_job_id(&job.source_url)) else {
            return Ok(FetchAttempt::NothingFound);
        };
        let Some(entry) = registry::entry_for(AtsFamily::Ashby) else {
            return Ok(FetchAttempt::NothingFound);
        };
        let Some(detail_url) = entry.api_detail_url_for(identifier, &job_id) else {
            return Ok(FetchAttempt::NothingFound);
        };

        let outcome = self.fetcher.fetch(&detail_url).await?;
        if outcome.status == 404 {
            // Fall back to a listing search before concluding the
            // posting is actually gone.
            if let Some(list_url) = entry.api_list_url_for(identifier) {
                if let Ok(listing) = self.fetcher.fetch(&list_url).await {
                    if let Some(body) = listing.body {
                        if let Some(extracted) = ashby::find_in_listing(&body, &job_id) {
                            return Ok(FetchAttempt::Found(extracted));
                        }
                    }
                }
            }
            return Ok(FetchAttempt::Delisted);
        }
        let Some(body) = outcome.body else {
            return Err(EnrichError::Fetch(FetchError::Status { url: detail_url, status: outcome.status }));
        };
        match AshbyExtractor.extract(&body, &detail_url, Some(identifier)).await {
            Ok(jobs) => Ok(jobs.into_iter().next().map(FetchAttempt::Found).unwrap_or(FetchAttempt::NothingFound)),
            Err(_) => Ok(FetchAttempt::NothingFound),
        }
    }

    async fn enrich_workable(&self, job: &Job, identifier: Option<&str>) -> Result<FetchAttempt, EnrichError> {
        let (Some(identifier), Some(shortcode)) = (identifier, workable::shortcode_from_url(&job.source_url)) else {
            return Ok(FetchAttempt::NothingFound);
        };
        let Some(entry) = registry::entry_for(AtsFamily::Workable) else {
            return Ok(FetchAttempt::NothingFound);
        };
        let Some(url) = entry.api_detail_url_for(identifier, &shortcode) else {
            return Ok(FetchAttempt::NothingFound);
        };

        let outcome = self.fetcher.fetch(&url).await?;
        if outcome.status == 404 {
            return Ok(FetchAttempt::Delisted);
        }
        let Some(body) = outcome.body else {
            return Err(EnrichError::Fetch(FetchError::Status { url, status: outcome.status }));
        };
        match WorkableExtractor.extract(&body, &url, Some(identifier)).await {
            Ok(jobs) => Ok(jobs.into_iter().next().map(FetchAttempt::Found).unwrap_or(FetchAttempt::NothingFound)),
            Err(_) => Ok(FetchAttempt::NothingFound),
        }
    }

    /// Families with no dedicated extractor: re-fetch the posting URL
    /// and try JSON-LD, then a handful of description selectors.
    async fn enrich_generic(&self, job: &Job) -> Result<FetchAttempt, EnrichError> {
        let outcome = self.fetcher.fetch(&job.source_url).await?;
        if outcome.status == 404 {
            return Ok(FetchAttempt::Delisted);
        }
        let Some(body) = outcome.body else {
            return Err(EnrichError::Fetch(FetchError::Status {
                url: job.source_url.clone(),
                status: outcome.status,
            }));
        };

        let html = match html_utils::sniff_response_body(&body) {
            ResponseBody::Html(html) => html,
            ResponseBody::Json(_) => return Ok(FetchAttempt::NothingFound),
        };

        if let Some(extracted) = jsonld::extract_job_postings_from_html(&html).into_iter().next() {
            return Ok(FetchAttempt::Found(extracted));
        }
        match extract_generic_description(&html, &job.source_url) {
            Some(extracted) => Ok(FetchAttempt::Found(extracted)),
            None => Ok(FetchAttempt::NothingFound),
        }
    }
}

fn apply_enrichment(job: &mut Job, extracted: ExtractedJob) {
    if let Some(description) = extracted.description {
        job.description = Some(description);
    }
    if let Some(posted_at) = extracted
        .posted_at
        .as_deref()
        .and_then(normalizer::parse_posted_at)
    {
        job.posted_at = Some(posted_at);
    }
    job.last_verified_at = Some(chrono::Utc::now());
    job.enrich_failed_at = None;
    job.updated_at = chrono::Utc::now();
}

fn greenhouse_job_id(source_url: &str) -> Option<String> {
    GREENHOUSE_JOB_ID.captures(source_url).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn ashby_job_id(source_url: &str) -> Option<String> {
    ASHBY_JOB_ID.find(source_url).map(|m| m.as_str().to_string())
}

fn extract_generic_description(html: &str, url: &str) -> Option<ExtractedJob> {
    for selector in DESCRIPTION_SELECTORS.iter() {
        if let Some(cap) = selector.captures(html) {
            let description = html_utils::html_to_markdown(cap.get(1).unwrap().as_str());
            if description.is_empty() {
                continue;
            }
            let title = html_utils::extract_title(html).unwrap_or_else(|| "Untitled Position".to_string());
            let mut job = ExtractedJob::new(title, url.to_string());
            job.description = Some(description);
            job.posted_at = DATE_POSTED_RE.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
            return Some(job);
        }
    }
    None
}

/// Bulk enrichment over a batch of job ids, bounded by `concurrency`,
/// mirroring `crawl::crawl_companies`'s per-task fan-out.
pub async fn enrich_jobs(
    engine: Arc<EnrichmentEngine>,
    job_ids: Vec<JobId>,
    concurrency: usize,
) -> Vec<(JobId, Result<EnrichOutcome, EnrichError>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();
    for job_id in job_ids {
        let engine = engine.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result = engine.enrich_job_by_id(job_id).await;
            (job_id, result)
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
    use crate::models::{Company, CompanyId, JobRaw, JobRawId};
    use crate::rate_limiter::RateLimiter;
    use crate::storage::memory::MemoryStorage;

    fn test_engine(storage: Arc<MemoryStorage>) -> EnrichmentEngine {
        let rate_limiter = Arc::new(RateLimiter::new(Default::default()));
        let fetcher = Arc::new(HttpFetcher::new(
            "test-agent",
            std::time::Duration::from_secs(5),
            rate_limiter,
        ));
        EnrichmentEngine::new(fetcher, storage)
    }

    fn test_job(company_id: CompanyId, source_url: &str) -> Job {
        let raw = JobRaw {
            id: JobRawId::new(),
            company_id,
            source_url: source_url.to_string(),
            title_raw: "Engineer".into(),
            description_raw: None,
            location_raw: None,
            department_raw: None,
            employment_type_raw: None,
            posted_at_raw: None,
            salary_raw: None,
            extracted_at: chrono::Utc::now(),
        };
        normalizer::normalize(&raw, None, 14.0)
    }

    #[test]
    fn greenhouse_job_id_matches_trailing_path_segment() {
        assert_eq!(
            greenhouse_job_id("https://boards.greenhouse.io/acme/jobs/123456").as_deref(),
            Some("123456")
        );
        assert_eq!(
            greenhouse_job_id("https://acme.com/careers?gh_jid=987654").as_deref(),
            Some("987654")
        );
        assert_eq!(
            greenhouse_job_id("https://acme.com/careers/42").as_deref(),
            Some("42")
        );
        assert_eq!(greenhouse_job_id("https://acme.com/careers"), None);
    }

    #[test]
    fn ashby_job_id_extracts_uuid_from_path() {
        let url = "https://jobs.ashbyhq.com/acme/3fa85f64-5717-4562-b3fc-2c963f66afa6";
        assert_eq!(
            ashby_job_id(url).as_deref(),
            Some("3fa85f64-5717-4562-b3fc-2c963f66afa6")
        );
    }

    #[test]
    fn generic_description_fallback_picks_first_matching_selector() {
        let html = r#"<html><title>Careers</title><body>
            <div class="description"><p>We build rockets.</p></div>
        </body></html>"#;
        let job = extract_generic_description(html, "https://acme.com/careers/swe").unwrap();
        assert_eq!(job.description.as_deref(), Some("We build rockets."));
    }

    #[tokio::test]
    async fn enrich_job_by_id_rejects_unknown_job() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = test_engine(storage);
        let result = engine.enrich_job_by_id(crate::models::JobId::new()).await;
        assert!(matches!(result, Err(EnrichError::NoPath)));
    }

    #[test]
    fn apply_enrichment_fills_description_and_parses_posted_at() {
        let company_id = CompanyId::new();
        let mut job = test_job(company_id, "https://acme.com/careers/swe");
        let mut extracted = ExtractedJob::new("Engineer", "https://acme.com/careers/swe");
        extracted.description = Some("Build things.".into());
        extracted.posted_at = Some("2024-03-15".into());
        apply_enrichment(&mut job, extracted);
        assert_eq!(job.description.as_deref(), Some("Build things."));
        assert!(job.posted_at.is_some());
        assert!(job.last_verified_at.is_some());
    }
}
