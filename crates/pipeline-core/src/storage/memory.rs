//! In-memory `Storage` implementation. Backs unit tests and the
//! integration tests in `tests/` so they don't require a live Postgres.

use super::Storage;
use crate::error::StorageError;
use crate::models::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStorage {
    companies: Mutex<HashMap<CompanyId, Company>>,
    snapshots: Mutex<HashMap<CompanyId, Vec<CrawlSnapshot>>>,
    jobs_raw: Mutex<HashMap<(CompanyId, String), JobRaw>>,
    jobs: Mutex<HashMap<JobId, Job>>,
    jobs_by_key: Mutex<HashMap<(CompanyId, String), JobId>>,
    discovery_queue: Mutex<HashMap<DiscoveryQueueId, DiscoveryQueueEntry>>,
    discovery_runs: Mutex<HashMap<DiscoveryRunId, DiscoveryRun>>,
    pipeline_runs: Mutex<HashMap<PipelineRunId, PipelineRun>>,
    maintenance_runs: Mutex<HashMap<MaintenanceRunId, MaintenanceRun>>,
    verification_runs: Mutex<HashMap<VerificationRunId, VerificationRun>>,
    job_board_listings: Mutex<HashMap<(JobId, String), JobBoardListing>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_company(&self, id: CompanyId) -> Result<Option<Company>, StorageError> {
        Ok(self.companies.lock().unwrap().get(&id).cloned())
    }

    async fn get_company_by_domain(&self, domain: &str) -> Result<Option<Company>, StorageError> {
        let normalized = crate::html_utils::normalize_domain(domain);
        Ok(self
            .companies
            .lock()
            .unwrap()
            .values()
            .find(|c| {
                c.domain
                    .as_deref()
                    .map(crate::html_utils::normalize_domain)
                    .as_deref()
                    == Some(normalized.as_str())
            })
            .cloned())
    }

    async fn insert_company(&self, company: Company) -> Result<Company, StorageError> {
        let mut companies = self.companies.lock().unwrap();
        if let Some(domain) = &company.domain {
            let normalized = crate::html_utils::normalize_domain(domain);
            let exists = companies.values().any(|c| {
                c.domain
                    .as_deref()
                    .map(crate::html_utils::normalize_domain)
                    .as_deref()
                    == Some(normalized.as_str())
            });
            if exists {
                return Err(StorageError::UniqueViolation {
                    constraint: "companies_domain_key".to_string(),
                });
            }
        }
        companies.insert(company.id, company.clone());
        Ok(company)
    }

    async fn update_company(&self, company: &Company) -> Result<(), StorageError> {
        self.companies.lock().unwrap().insert(company.id, company.clone());
        Ok(())
    }

    async fn list_companies_for_crawl(
        &self,
        family: Option<AtsFamily>,
        limit: i64,
    ) -> Result<Vec<Company>, StorageError> {
        let companies = self.companies.lock().unwrap();
        let mut result: Vec<Company> = companies
            .values()
            .filter(|c| c.is_active && c.careers_url.is_some())
            .filter(|c| family.map_or(true, |f| c.ats_family == Some(f)))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.crawl_priority.cmp(&a.crawl_priority));
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn list_companies_for_maintenance(&self, limit: i64) -> Result<Vec<Company>, StorageError> {
        let companies = self.companies.lock().unwrap();
        let mut result: Vec<Company> = companies
            .values()
            .filter(|c| c.is_active && c.ats_family.is_some())
            .cloned()
            .collect();
        result.sort_by_key(|c| c.last_maintenance_at);
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn list_companies_for_network_crawl(&self, limit: i64) -> Result<Vec<Company>, StorageError> {
        let companies = self.companies.lock().unwrap();
        let mut result: Vec<Company> = companies
            .values()
            .filter(|c| c.is_active && c.last_crawled_for_network.is_none())
            .cloned()
            .collect();
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn known_domains(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .companies
            .lock()
            .unwrap()
            .values()
            .filter_map(|c| c.domain.clone())
            .chain(
                self.discovery_queue
                    .lock()
                    .unwrap()
                    .values()
                    .filter_map(|q| q.domain.clone()),
            )
            .collect())
    }

    async fn known_ats_pairs(&self) -> Result<Vec<(AtsFamily, String)>, StorageError> {
        Ok(self
            .companies
            .lock()
            .unwrap()
            .values()
            .filter_map(|c| match (c.ats_family, &c.ats_identifier) {
                (Some(family), Some(id)) => Some((family, id.clone())),
                _ => None,
            })
            .collect())
    }

    async fn latest_snapshot(&self, company_id: CompanyId) -> Result<Option<CrawlSnapshot>, StorageError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(&company_id)
            .and_then(|v| v.last().cloned()))
    }

    async fn insert_snapshot(&self, snapshot: CrawlSnapshot) -> Result<CrawlSnapshotId, StorageError> {
        let id = snapshot.id;
        self.snapshots
            .lock()
            .unwrap()
            .entry(snapshot.company_id)
            .or_default()
            .push(snapshot);
        Ok(id)
    }

    async fn upsert_job_raw(&self, raw: JobRaw) -> Result<JobRawId, StorageError> {
        let key = (raw.company_id, raw.source_url.clone());
        let mut jobs_raw = self.jobs_raw.lock().unwrap();
        let id = match jobs_raw.get(&key) {
            Some(existing) => existing.id,
            None => raw.id,
        };
        let mut raw = raw;
        raw.id = id;
        jobs_raw.insert(key, raw);
        Ok(id)
    }

    async fn upsert_job(&self, job: Job) -> Result<JobId, StorageError> {
        let key = (job.company_id, job.source_url.clone());
        let mut jobs_by_key = self.jobs_by_key.lock().unwrap();
        let mut jobs = self.jobs.lock().unwrap();
        let id = match jobs_by_key.get(&key) {
            Some(existing_id) => *existing_id,
            None => job.id,
        };
        let mut job = job;
        job.id = id;
        jobs_by_key.insert(key, id);
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StorageError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn get_job_by_source_url(
        &self,
        company_id: CompanyId,
        source_url: &str,
    ) -> Result<Option<Job>, StorageError> {
        let key = (company_id, source_url.to_string());
        let jobs_by_key = self.jobs_by_key.lock().unwrap();
        Ok(jobs_by_key
            .get(&key)
            .and_then(|id| self.jobs.lock().unwrap().get(id).cloned()))
    }

    async fn active_jobs_for_company(&self, company_id: CompanyId) -> Result<Vec<Job>, StorageError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.company_id == company_id && j.is_active)
            .cloned()
            .collect())
    }

    async fn jobs_missing_description(&self, limit: i64) -> Result<Vec<Job>, StorageError> {
        let mut result: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.is_active && j.description.is_none() && j.enrich_failed_at.is_none())
            .cloned()
            .collect();
        result.sort_by_key(|j| j.created_at);
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn jobs_missing_embedding(&self, limit: i64) -> Result<Vec<Job>, StorageError> {
        let mut result: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.is_active && j.embedding.is_none())
            .cloned()
            .collect();
        result.sort_by_key(|j| j.created_at);
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn update_job(&self, job: &Job) -> Result<(), StorageError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        self.jobs_by_key
            .lock()
            .unwrap()
            .insert((job.company_id, job.source_url.clone()), job.id);
        Ok(())
    }

    async fn update_job_embedding(&self, id: JobId, embedding: Vec<f32>) -> Result<(), StorageError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.embedding = Some(embedding);
            job.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn insert_discovery_queue_entry(
        &self,
        entry: DiscoveryQueueEntry,
    ) -> Result<DiscoveryQueueId, StorageError> {
        let id = entry.id;
        self.discovery_queue.lock().unwrap().insert(id, entry);
        Ok(id)
    }

    async fn claim_pending_discovery_entries(
        &self,
        limit: i64,
    ) -> Result<Vec<DiscoveryQueueEntry>, StorageError> {
        let mut queue = self.discovery_queue.lock().unwrap();
        let mut pending: Vec<DiscoveryQueueEntry> = queue
            .values()
            .filter(|e| e.status == DiscoveryQueueStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit.max(0) as usize);
        for entry in &pending {
            if let Some(stored) = queue.get_mut(&entry.id) {
                stored.status = DiscoveryQueueStatus::Processing;
            }
        }
        Ok(pending
            .into_iter()
            .map(|mut e| {
                e.status = DiscoveryQueueStatus::Processing;
                e
            })
            .collect())
    }

    async fn update_discovery_queue_entry(&self, entry: &DiscoveryQueueEntry) -> Result<(), StorageError> {
        self.discovery_queue.lock().unwrap().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn set_discovery_queue_status(
        &self,
        id: DiscoveryQueueId,
        status: DiscoveryQueueStatus,
    ) -> Result<(), StorageError> {
        let mut queue = self.discovery_queue.lock().unwrap();
        let entry = queue.get_mut(&id).ok_or(StorageError::NotFound)?;
        entry.status = status;
        Ok(())
    }

    async fn insert_discovery_run(&self, run: DiscoveryRun) -> Result<DiscoveryRunId, StorageError> {
        let id = run.id;
        self.discovery_runs.lock().unwrap().insert(id, run);
        Ok(id)
    }

    async fn update_discovery_run(&self, run: &DiscoveryRun) -> Result<(), StorageError> {
        self.discovery_runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn get_discovery_run(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>, StorageError> {
        Ok(self.discovery_runs.lock().unwrap().get(&id).cloned())
    }

    async fn append_discovery_run_log(
        &self,
        id: DiscoveryRunId,
        entry: RunLogEntry,
    ) -> Result<(), StorageError> {
        let mut runs = self.discovery_runs.lock().unwrap();
        let run = runs.get_mut(&id).ok_or(StorageError::NotFound)?;
        run.logs.push(entry);
        Ok(())
    }

    async fn insert_pipeline_run(&self, run: PipelineRun) -> Result<PipelineRunId, StorageError> {
        let id = run.id;
        self.pipeline_runs.lock().unwrap().insert(id, run);
        Ok(id)
    }

    async fn update_pipeline_run(&self, run: &PipelineRun) -> Result<(), StorageError> {
        self.pipeline_runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn get_pipeline_run(&self, id: PipelineRunId) -> Result<Option<PipelineRun>, StorageError> {
        Ok(self.pipeline_runs.lock().unwrap().get(&id).cloned())
    }

    async fn append_pipeline_run_log(
        &self,
        id: PipelineRunId,
        entry: RunLogEntry,
    ) -> Result<(), StorageError> {
        let mut runs = self.pipeline_runs.lock().unwrap();
        let run = runs.get_mut(&id).ok_or(StorageError::NotFound)?;
        run.logs.push(entry);
        Ok(())
    }

    async fn insert_maintenance_run(&self, run: MaintenanceRun) -> Result<MaintenanceRunId, StorageError> {
        let id = run.id;
        self.maintenance_runs.lock().unwrap().insert(id, run);
        Ok(id)
    }

    async fn update_maintenance_run(&self, run: &MaintenanceRun) -> Result<(), StorageError> {
        self.maintenance_runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn insert_verification_run(&self, run: VerificationRun) -> Result<VerificationRunId, StorageError> {
        let id = run.id;
        self.verification_runs.lock().unwrap().insert(id, run);
        Ok(id)
    }

    async fn update_verification_run(&self, run: &VerificationRun) -> Result<(), StorageError> {
        self.verification_runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn upsert_job_board_listing(&self, listing: JobBoardListing) -> Result<(), StorageError> {
        self.job_board_listings
            .lock()
            .unwrap()
            .insert((listing.job_id, listing.board.clone()), listing);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserting_duplicate_domain_is_a_unique_violation() {
        let storage = MemoryStorage::new();
        let mut acme = Company::new("Acme");
        acme.domain = Some("acme.com".to_string());
        storage.insert_company(acme.clone()).await.unwrap();

        let mut dup = Company::new("Acme Inc");
        dup.domain = Some("www.ACME.com".to_string());
        let err = storage.insert_company(dup).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn job_upsert_is_keyed_on_company_and_source_url() {
        let storage = MemoryStorage::new();
        let company_id = CompanyId::new();
        let mut job = Job {
            id: JobId::new(),
            company_id,
            raw_job_id: None,
            title: "SWE".into(),
            description: None,
            source_url: "https://boards.greenhouse.io/acme/jobs/1".into(),
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
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let first_id = storage.upsert_job(job.clone()).await.unwrap();
        job.id = JobId::new();
        job.title = "Senior SWE".into();
        let second_id = storage.upsert_job(job).await.unwrap();
        assert_eq!(first_id, second_id);
        let stored = storage.get_job(first_id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Senior SWE");
    }
}
