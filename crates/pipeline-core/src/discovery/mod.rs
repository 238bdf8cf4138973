//! Discovery Sources and the Discovery Orchestrator.
//!
//! A Source is a plug-in the Orchestrator constructs and holds by
//! value (no reflection) — it emits `DiscoveredCompany` values over an
//! `mpsc` channel from a spawned worker task rather than through a
//! `Stream` impl.

pub mod sources;

use crate::dedup::DeduplicationService;
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::http_fetcher::Fetcher;
use crate::models::{
    Company, DiscoveredCompany, DiscoveryQueueEntry, DiscoveryQueueId, DiscoveryQueueStatus,
    DiscoveryRun, DiscoverySourceKind, RunLogLevel, RunStatus,
};
use crate::storage::Storage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Shared collaborators every Source needs; constructed once by the
/// Orchestrator and handed to each Source by reference.
pub struct SourceContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub dedup: Arc<DeduplicationService>,
    pub storage: Arc<dyn Storage>,
}

/// `progress_current`/`progress_total` the Orchestrator reads for run
/// telemetry. `total` is `None` when a Source can't know
/// its size up front (an RSS feed, a paginated search).
#[derive(Default)]
pub struct ProgressTracker {
    current: AtomicI64,
    total: AtomicI64,
}

impl ProgressTracker {
    pub fn set_total(&self, total: i64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (i64, Option<i64>) {
        let total = self.total.load(Ordering::Relaxed);
        (
            self.current.load(Ordering::Relaxed),
            if total > 0 { Some(total) } else { None },
        )
    }
}

/// A Discovery Source: `initialize()`/`cleanup()` bookends around a
/// `discover()` run that pushes emissions onto the shared channel.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn kind(&self) -> DiscoverySourceKind;
    fn name(&self) -> &str;

    async fn initialize(&self, _ctx: &SourceContext) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError>;

    async fn cleanup(&self, _ctx: &SourceContext) -> Result<(), DiscoveryError> {
        Ok(())
    }
}

/// Evidence-of-US check for the admission rule's U.S.-only filter
///: country, a recognizable U.S. location string, a
/// resolved ATS+careers URL, or a source kind that only ever surfaces
/// trustworthy (i.e. already-US-scoped) candidates.
fn has_us_evidence(candidate: &DiscoveredCompany, source: DiscoverySourceKind) -> bool {
    if let Some(country) = &candidate.country {
        if country.eq_ignore_ascii_case("us") || country.eq_ignore_ascii_case("usa") {
            return true;
        }
    }
    if let Some(location) = &candidate.location {
        let (location_type, canonical) = crate::normalizer::classify_location(location);
        if location_type.is_some() && !canonical.is_empty() {
            return true;
        }
    }
    if candidate.ats_family.is_some() && candidate.careers_url.is_some() {
        return true;
    }
    matches!(
        source,
        DiscoverySourceKind::AtsDirectory | DiscoverySourceKind::AtsProber
    )
}

pub struct DiscoveryOrchestrator {
    storage: Arc<dyn Storage>,
    dedup: Arc<DeduplicationService>,
    fetcher: Arc<dyn Fetcher>,
    us_only_filter: bool,
}

impl DiscoveryOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        dedup: Arc<DeduplicationService>,
        fetcher: Arc<dyn Fetcher>,
        us_only_filter: bool,
    ) -> Self {
        Self {
            storage,
            dedup,
            fetcher,
            us_only_filter,
        }
    }

    /// Seeds the Dedup Service from storage: existing Company domains,
    /// queued domains, and existing `(family, identifier)` pairs.
    pub async fn hydrate_dedup(&self) -> Result<(), DiscoveryError> {
        let domains = self.storage.known_domains().await?;
        let pairs = self.storage.known_ats_pairs().await?;
        self.dedup.hydrate(domains, pairs).await;
        Ok(())
    }

    /// Runs every given Source concurrently under one DiscoveryRun,
    /// applying the admission rule to each emission as it arrives.
    pub async fn run(
        &self,
        sources: Vec<Arc<dyn DiscoverySource>>,
    ) -> Result<DiscoveryRun, DiscoveryError> {
        self.hydrate_dedup().await?;

        let mut run = DiscoveryRun::start("discovery");
        run.log(RunLogLevel::Info, format!("starting {} source(s)", sources.len()));
        let run_id = self.storage.insert_discovery_run(run.clone()).await?;
        run.id = run_id;

        let ctx = SourceContext {
            fetcher: self.fetcher.clone(),
            dedup: self.dedup.clone(),
            storage: self.storage.clone(),
        };

        let (tx, mut rx) = mpsc::channel::<(DiscoverySourceKind, DiscoveredCompany)>(256);
        let progress = Arc::new(ProgressTracker::default());

        let mut handles = Vec::new();
        for source in sources {
            let tx = tx.clone();
            let fetcher = ctx.fetcher.clone();
            let dedup = ctx.dedup.clone();
            let storage = ctx.storage.clone();
            let progress = progress.clone();
            let kind = source.kind();
            handles.push((kind, tokio::spawn(async move {
                let ctx = SourceContext { fetcher, dedup, storage };
                let name = source.name().to_string();
                if let Err(e) = source.initialize(&ctx).await {
                    warn!(source = %name, error = %e, "source failed to initialize");
                    return Err(DiscoveryError::InitializeFailed {
                        source_name: name,
                        reason: e.to_string(),
                    });
                }
                let result = source.discover(&ctx, &progress, &tx).await;
                let _ = source.cleanup(&ctx).await;
                if let Err(e) = &result {
                    warn!(source = %name, error = %e, "source errored during discovery");
                }
                result
            })));
        }
        drop(tx);

        let mut emissions_since_log = 0u32;
        let mut inserts_since_commit = 0u32;

        while let Some((source_kind, candidate)) = rx.recv().await {
            run.counters.discovered += 1;
            run.counters.by_source.entry(source_kind.as_str().to_string()).or_default().discovered += 1;

            let outcome = self.admit(&candidate, source_kind).await;
            let per_source = run.counters.by_source.entry(source_kind.as_str().to_string()).or_default();
            match outcome {
                AdmissionOutcome::Duplicate => {
                    run.counters.duplicates += 1;
                    per_source.duplicates += 1;
                }
                AdmissionOutcome::NonUs => {
                    run.counters.non_us += 1;
                    per_source.non_us += 1;
                }
                AdmissionOutcome::InsertedCompany => {
                    run.counters.new += 1;
                    per_source.new += 1;
                    inserts_since_commit += 1;
                }
                AdmissionOutcome::QueuedForReview => {
                    run.counters.new += 1;
                    per_source.new += 1;
                    inserts_since_commit += 1;
                }
            }

            emissions_since_log += 1;
            if emissions_since_log >= 50 || inserts_since_commit >= 10 {
                run.log(
                    RunLogLevel::Info,
                    format!(
                        "discovered={} new={} duplicates={} non_us={}",
                        run.counters.discovered, run.counters.new, run.counters.duplicates, run.counters.non_us
                    ),
                );
                self.storage.update_discovery_run(&run).await?;
                emissions_since_log = 0;
                inserts_since_commit = 0;
            }
        }

        for (kind, handle) in handles {
            if let Ok(Err(e)) = handle.await {
                run.counters.errors += 1;
                run.counters.by_source.entry(kind.as_str().to_string()).or_default().errors += 1;
                run.log(RunLogLevel::Error, e.to_string());
            }
        }

        run.finish(RunStatus::Completed);
        run.log(
            RunLogLevel::Info,
            format!(
                "finished: discovered={} new={} duplicates={} non_us={} errors={}",
                run.counters.discovered, run.counters.new, run.counters.duplicates, run.counters.non_us, run.counters.errors
            ),
        );
        self.storage.update_discovery_run(&run).await?;
        info!(run_id = %run.id, "discovery run complete");
        Ok(run)
    }

    /// The admission rule Marks the domain in the Dedup
    /// Service before any insert commits, so concurrent sources never
    /// race each other into a duplicate row.
    async fn admit(&self, candidate: &DiscoveredCompany, source: DiscoverySourceKind) -> AdmissionOutcome {
        let normalized_domain = candidate.domain.as_deref().map(html_utils::normalize_domain);

        if let Some(domain) = &normalized_domain {
            if self.dedup.is_duplicate_domain(domain).await {
                return AdmissionOutcome::Duplicate;
            }
        }

        if self.us_only_filter && !has_us_evidence(candidate, source) {
            return AdmissionOutcome::NonUs;
        }

        if let Some(domain) = &normalized_domain {
            if !self.dedup.mark_domain(domain).await {
                return AdmissionOutcome::Duplicate;
            }
        }

        if candidate.domain.is_some() && candidate.careers_url.is_some() {
            let mut company = Company::new(candidate.name.clone());
            company.domain = candidate.domain.clone();
            company.careers_url = candidate.careers_url.clone();
            company.website_url = candidate.website_url.clone();
            company.ats_family = candidate.ats_family;
            company.ats_identifier = candidate.ats_identifier.clone();
            company.discovery_source = Some(source);
            company.country = candidate.country.clone();
            company.location = candidate.location.clone();
            company.industry = candidate.industry.clone();
            company.employee_count = candidate.employee_count;
            company.funding_stage = candidate.funding_stage.clone();
            company.crawl_priority = 30;

            match self.storage.insert_company(company).await {
                Ok(_) => return AdmissionOutcome::InsertedCompany,
                Err(e) if e.is_unique_violation() => return AdmissionOutcome::Duplicate,
                Err(_) => return AdmissionOutcome::QueuedForReview,
            }
        }

        let entry = DiscoveryQueueEntry {
            id: DiscoveryQueueId::new(),
            name: candidate.name.clone(),
            domain: candidate.domain.clone(),
            careers_url: candidate.careers_url.clone(),
            website_url: candidate.website_url.clone(),
            source,
            source_url: candidate.source_url.clone(),
            location: candidate.location.clone(),
            country: candidate.country.clone(),
            description: candidate.description.clone(),
            industry: candidate.industry.clone(),
            employee_count: candidate.employee_count,
            funding_stage: candidate.funding_stage.clone(),
            ats_family: candidate.ats_family,
            ats_identifier: candidate.ats_identifier.clone(),
            status: DiscoveryQueueStatus::Pending,
            error_message: None,
            retry_count: 0,
            created_at: chrono::Utc::now(),
            processed_at: None,
            company_id: None,
        };
        match self.storage.insert_discovery_queue_entry(entry).await {
            Ok(_) => AdmissionOutcome::QueuedForReview,
            Err(_) => AdmissionOutcome::Duplicate,
        }
    }

    /// Queue processing, row-locked claim of pending rows,
    /// careers-URL discovery and ATS detection per row, promote to
    /// Company or retry/fail.
    pub async fn process_queue(&self, limit: i64) -> Result<QueueProcessingStats, DiscoveryError> {
        let entries = self.storage.claim_pending_discovery_entries(limit).await?;
        let mut stats = QueueProcessingStats::default();

        for mut entry in entries {
            stats.claimed += 1;
            match self.try_promote(&entry).await {
                Ok(Some(company_id)) => {
                    entry.status = DiscoveryQueueStatus::Completed;
                    entry.company_id = Some(company_id);
                    entry.processed_at = Some(chrono::Utc::now());
                    self.storage.update_discovery_queue_entry(&entry).await?;
                    stats.promoted += 1;
                }
                Ok(None) => {
                    entry.status = DiscoveryQueueStatus::Review;
                    entry.processed_at = Some(chrono::Utc::now());
                    self.storage.update_discovery_queue_entry(&entry).await?;
                    stats.review += 1;
                }
                Err(e) => {
                    entry.retry_count += 1;
                    entry.error_message = Some(e.to_string());
                    entry.status = if entry.retry_count >= 3 {
                        DiscoveryQueueStatus::Failed
                    } else {
                        DiscoveryQueueStatus::Pending
                    };
                    self.storage.update_discovery_queue_entry(&entry).await?;
                    if entry.status == DiscoveryQueueStatus::Failed {
                        stats.failed += 1;
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Returns `Ok(Some(company_id))` on a promotion, `Ok(None)` when
    /// no careers page could be found (row goes to `review`), `Err`
    /// on a transient failure (row is retried up to the ceiling).
    async fn try_promote(&self, entry: &DiscoveryQueueEntry) -> Result<Option<crate::models::CompanyId>, DiscoveryError> {
        let Some(domain) = &entry.domain else {
            return Ok(None);
        };

        let careers_url = match &entry.careers_url {
            Some(url) => url.clone(),
            None => match self.discover_careers_url(domain).await? {
                Some(url) => url,
                None => return Ok(None),
            },
        };

        let detector = crate::ats::detector::Detector::new(&self.fetcher);
        let detection = detector.detect_from_careers_url(&careers_url, Some(domain)).await.ok();

        let mut company = match self.storage.get_company_by_domain(domain).await? {
            Some(existing) => existing,
            None => Company::new(entry.name.clone()),
        };
        company.domain = Some(domain.clone());
        company.careers_url = Some(careers_url);
        company.website_url = entry.website_url.clone().or(company.website_url);
        company.discovery_source = Some(entry.source);
        company.country = entry.country.clone().or(company.country);
        company.location = entry.location.clone().or(company.location);
        company.industry = entry.industry.clone().or(company.industry);
        company.employee_count = entry.employee_count.or(company.employee_count);
        company.funding_stage = entry.funding_stage.clone().or(company.funding_stage);
        if let Some(detection) = detection {
            company.ats_family = Some(detection.family);
            company.ats_identifier = detection.identifier;
        }

        let company = match self.storage.insert_company(company.clone()).await {
            Ok(inserted) => inserted,
            Err(e) if e.is_unique_violation() => {
                self.storage.update_company(&company).await?;
                company
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(company.id))
    }

    /// Probes common careers-page paths off the bare domain; used when
    /// a queue row carries a domain but no `careers_url` yet.
    async fn discover_careers_url(&self, domain: &str) -> Result<Option<String>, DiscoveryError> {
        const CANDIDATE_PATHS: &[&str] = &["/careers", "/jobs", "/about/careers", "/company/careers"];
        for path in CANDIDATE_PATHS {
            let url = format!("https://{domain}{path}");
            if let Ok(outcome) = self.fetcher.head(&url).await {
                if outcome.status < 400 {
                    return Ok(Some(url));
                }
            }
        }
        Ok(None)
    }
}

enum AdmissionOutcome {
    Duplicate,
    NonUs,
    InsertedCompany,
    QueuedForReview,
}

#[derive(Debug, Clone, Default)]
pub struct QueueProcessingStats {
    pub claimed: usize,
    pub promoted: usize,
    pub review: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn test_fetcher() -> Arc<dyn Fetcher> {
        let rate_limiter = Arc::new(crate::rate_limiter::RateLimiter::new(Default::default()));
        Arc::new(crate::http_fetcher::HttpFetcher::new("test-agent", std::time::Duration::from_secs(5), rate_limiter))
    }

    #[tokio::test]
    async fn duplicate_domain_is_counted_not_inserted() {
        let storage = Arc::new(MemoryStorage::new());
        let mut existing = Company::new("Acme");
        existing.domain = Some("acme.com".to_string());
        storage.insert_company(existing).await.unwrap();

        let dedup = Arc::new(DeduplicationService::new());
        let orchestrator = DiscoveryOrchestrator::new(storage, dedup, test_fetcher(), false);
        orchestrator.hydrate_dedup().await.unwrap();

        let candidate = DiscoveredCompany {
            name: "Acme".to_string(),
            domain: Some("acme.com".to_string()),
            ..Default::default()
        };
        let outcome = orchestrator.admit(&candidate, DiscoverySourceKind::AtsDirectory).await;
        assert!(matches!(outcome, AdmissionOutcome::Duplicate));
    }

    #[tokio::test]
    async fn candidate_with_domain_and_careers_url_inserts_company_directly() {
        let storage = Arc::new(MemoryStorage::new());
        let dedup = Arc::new(DeduplicationService::new());
        let orchestrator = DiscoveryOrchestrator::new(storage.clone(), dedup, test_fetcher(), false);
        orchestrator.hydrate_dedup().await.unwrap();

        let candidate = DiscoveredCompany {
            name: "Beta".to_string(),
            domain: Some("beta.io".to_string()),
            careers_url: Some("https://beta.io/careers".to_string()),
            ..Default::default()
        };
        let outcome = orchestrator.admit(&candidate, DiscoverySourceKind::AtsDirectory).await;
        assert!(matches!(outcome, AdmissionOutcome::InsertedCompany));
        let company = storage.get_company_by_domain("beta.io").await.unwrap().unwrap();
        assert_eq!(company.crawl_priority, 30);
    }

    #[tokio::test]
    async fn candidate_without_careers_url_goes_to_queue() {
        let storage = Arc::new(MemoryStorage::new());
        let dedup = Arc::new(DeduplicationService::new());
        let orchestrator = DiscoveryOrchestrator::new(storage.clone(), dedup, test_fetcher(), false);
        orchestrator.hydrate_dedup().await.unwrap();

        let candidate = DiscoveredCompany {
            name: "Gamma".to_string(),
            domain: Some("gamma.io".to_string()),
            ..Default::default()
        };
        let outcome = orchestrator.admit(&candidate, DiscoverySourceKind::FundingNews).await;
        assert!(matches!(outcome, AdmissionOutcome::QueuedForReview));
        let queued = storage.claim_pending_discovery_entries(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].name, "Gamma");
    }

    #[tokio::test]
    async fn non_us_filter_rejects_candidates_without_us_evidence() {
        let storage = Arc::new(MemoryStorage::new());
        let dedup = Arc::new(DeduplicationService::new());
        let orchestrator = DiscoveryOrchestrator::new(storage, dedup, test_fetcher(), true);
        orchestrator.hydrate_dedup().await.unwrap();

        let candidate = DiscoveredCompany {
            name: "Delta".to_string(),
            domain: Some("delta.io".to_string()),
            ..Default::default()
        };
        let outcome = orchestrator.admit(&candidate, DiscoverySourceKind::FundingNews).await;
        assert!(matches!(outcome, AdmissionOutcome::NonUs));
    }
}
