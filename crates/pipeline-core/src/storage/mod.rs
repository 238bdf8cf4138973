//! The `Storage` trait: the only boundary between the pipeline and the
//! relational store. `memory` backs unit and integration tests;
//! `postgres` (behind the `postgres` feature) is the production
//! `sqlx` implementation.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::StorageError;
use crate::models::{
    AtsFamily, Company, CompanyId, CrawlSnapshot, CrawlSnapshotId, DiscoveryQueueEntry,
    DiscoveryQueueId, DiscoveryQueueStatus, DiscoveryRun, DiscoveryRunId, Job, JobBoardListing,
    JobId, JobRaw, JobRawId, MaintenanceRun, MaintenanceRunId, PipelineRun, PipelineRunId,
    RunLogEntry, VerificationRun, VerificationRunId,
};
use async_trait::async_trait;

/// Every method opens/uses its own connection rather than threading one
/// through a call chain — implementations must be `Clone` over a pooled
/// handle (`sqlx::PgPool` is internally `Arc`-backed) rather than
/// carry a single borrowed connection.
#[async_trait]
pub trait Storage: Send + Sync {
    // ---- Company ----
    async fn get_company(&self, id: CompanyId) -> Result<Option<Company>, StorageError>;
    async fn get_company_by_domain(&self, domain: &str) -> Result<Option<Company>, StorageError>;
    /// Inserts a new Company; on a unique-violation (duplicate domain)
    /// returns `Err(StorageError::UniqueViolation)` so the caller can
    /// re-read the outcome as `duplicate`, never a hard failure.
    async fn insert_company(&self, company: Company) -> Result<Company, StorageError>;
    async fn update_company(&self, company: &Company) -> Result<(), StorageError>;
    async fn list_companies_for_crawl(
        &self,
        family: Option<AtsFamily>,
        limit: i64,
    ) -> Result<Vec<Company>, StorageError>;
    async fn list_companies_for_maintenance(&self, limit: i64) -> Result<Vec<Company>, StorageError>;
    async fn list_companies_for_network_crawl(&self, limit: i64) -> Result<Vec<Company>, StorageError>;
    async fn known_domains(&self) -> Result<Vec<String>, StorageError>;
    async fn known_ats_pairs(&self) -> Result<Vec<(AtsFamily, String)>, StorageError>;

    // ---- CrawlSnapshot ----
    async fn latest_snapshot(&self, company_id: CompanyId) -> Result<Option<CrawlSnapshot>, StorageError>;
    async fn insert_snapshot(&self, snapshot: CrawlSnapshot) -> Result<CrawlSnapshotId, StorageError>;

    // ---- JobRaw / Job ----
    /// Upserts by `(company_id, source_url)` — the Crawl Engine invokes
    /// this per extracted job; duplicates within one extraction update
    /// the existing row in place.
    async fn upsert_job_raw(&self, raw: JobRaw) -> Result<JobRawId, StorageError>;
    async fn upsert_job(&self, job: Job) -> Result<JobId, StorageError>;
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StorageError>;
    async fn get_job_by_source_url(
        &self,
        company_id: CompanyId,
        source_url: &str,
    ) -> Result<Option<Job>, StorageError>;
    async fn active_jobs_for_company(&self, company_id: CompanyId) -> Result<Vec<Job>, StorageError>;
    async fn jobs_missing_description(&self, limit: i64) -> Result<Vec<Job>, StorageError>;
    async fn jobs_missing_embedding(&self, limit: i64) -> Result<Vec<Job>, StorageError>;
    async fn update_job(&self, job: &Job) -> Result<(), StorageError>;
    async fn update_job_embedding(&self, id: JobId, embedding: Vec<f32>) -> Result<(), StorageError>;

    // ---- DiscoveryQueue ----
    async fn insert_discovery_queue_entry(
        &self,
        entry: DiscoveryQueueEntry,
    ) -> Result<DiscoveryQueueId, StorageError>;
    /// Row-locked claim of up to `limit` pending rows (`SKIP LOCKED`
    /// under Postgres) — queue processing.
    async fn claim_pending_discovery_entries(
        &self,
        limit: i64,
    ) -> Result<Vec<DiscoveryQueueEntry>, StorageError>;
    async fn update_discovery_queue_entry(&self, entry: &DiscoveryQueueEntry) -> Result<(), StorageError>;
    async fn set_discovery_queue_status(
        &self,
        id: DiscoveryQueueId,
        status: DiscoveryQueueStatus,
    ) -> Result<(), StorageError>;

    // ---- Run records ----
    async fn insert_discovery_run(&self, run: DiscoveryRun) -> Result<DiscoveryRunId, StorageError>;
    async fn update_discovery_run(&self, run: &DiscoveryRun) -> Result<(), StorageError>;
    async fn get_discovery_run(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>, StorageError>;
    async fn append_discovery_run_log(
        &self,
        id: DiscoveryRunId,
        entry: RunLogEntry,
    ) -> Result<(), StorageError>;

    async fn insert_pipeline_run(&self, run: PipelineRun) -> Result<PipelineRunId, StorageError>;
    async fn update_pipeline_run(&self, run: &PipelineRun) -> Result<(), StorageError>;
    async fn get_pipeline_run(&self, id: PipelineRunId) -> Result<Option<PipelineRun>, StorageError>;
    async fn append_pipeline_run_log(
        &self,
        id: PipelineRunId,
        entry: RunLogEntry,
    ) -> Result<(), StorageError>;

    async fn insert_maintenance_run(&self, run: MaintenanceRun) -> Result<MaintenanceRunId, StorageError>;
    async fn update_maintenance_run(&self, run: &MaintenanceRun) -> Result<(), StorageError>;

    async fn insert_verification_run(&self, run: VerificationRun) -> Result<VerificationRunId, StorageError>;
    async fn update_verification_run(&self, run: &VerificationRun) -> Result<(), StorageError>;

    // ---- JobBoardListing ----
    async fn upsert_job_board_listing(&self, listing: JobBoardListing) -> Result<(), StorageError>;
}
