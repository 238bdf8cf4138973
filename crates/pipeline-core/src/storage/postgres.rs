//! `sqlx`/Postgres `Storage` implementation, behind the `postgres`
//! feature. Every method borrows `&PgPool` and opens its own connection
//! per call rather than threading one through parallel tasks.
//! Rows are mapped by hand (not `query_as!`) since the compile-time
//! macro requires a live database at build time, which this workspace
//! does not assume.

use super::Storage;
use crate::error::StorageError;
use crate::models::*;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(e.into()))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.into()))
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StorageError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or_default().to_string(),
            };
        }
    }
    StorageError::Backend(e.into())
}

fn company_from_row(row: &sqlx::postgres::PgRow) -> Company {
    Company {
        id: CompanyId(row.get("id")),
        name: row.get("name"),
        domain: row.get("domain"),
        careers_url: row.get("careers_url"),
        website_url: row.get("website_url"),
        ats_family: row
            .get::<Option<String>, _>("ats_family")
            .and_then(|s| AtsFamily::from_str(&s).ok()),
        ats_identifier: row.get("ats_identifier"),
        parent_company_id: row.get::<Option<uuid::Uuid>, _>("parent_company_id").map(CompanyId),
        discovery_source: row
            .get::<Option<String>, _>("discovery_source")
            .and_then(|s| discovery_source_from_str(&s)),
        country: row.get("country"),
        location: row.get("location"),
        industry: row.get("industry"),
        employee_count: row.get("employee_count"),
        funding_stage: row.get("funding_stage"),
        crawl_priority: row.get("crawl_priority"),
        is_active: row.get("is_active"),
        last_crawled_at: row.get("last_crawled_at"),
        last_maintenance_at: row.get("last_maintenance_at"),
        last_crawled_for_network: row.get("last_crawled_for_network"),
        ats_detection_attempts: row.get("ats_detection_attempts"),
        ats_detection_last_at: row.get("ats_detection_last_at"),
        created_at: row.get("created_at"),
    }
}

fn discovery_source_from_str(s: &str) -> Option<DiscoverySourceKind> {
    Some(match s {
        "ats_directory" => DiscoverySourceKind::AtsDirectory,
        "accelerator" => DiscoverySourceKind::Accelerator,
        "funding_news" => DiscoverySourceKind::FundingNews,
        "job_aggregator" => DiscoverySourceKind::JobAggregator,
        "network_crawler" => DiscoverySourceKind::NetworkCrawler,
        "ats_prober" => DiscoverySourceKind::AtsProber,
        "google_search" => DiscoverySourceKind::GoogleSearch,
        _ => return None,
    })
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Job {
    Job {
        id: JobId(row.get("id")),
        company_id: CompanyId(row.get("company_id")),
        raw_job_id: row.get::<Option<uuid::Uuid>, _>("raw_job_id").map(JobRawId),
        title: row.get("title"),
        description: row.get("description"),
        source_url: row.get("source_url"),
        role_family: role_family_from_str(row.get("role_family")),
        role_specialization: row.get("role_specialization"),
        seniority: row
            .get::<Option<String>, _>("seniority")
            .and_then(|s| seniority_from_str(&s)),
        location_type: row
            .get::<Option<String>, _>("location_type")
            .and_then(|s| location_type_from_str(&s)),
        locations: row.get::<Option<Vec<String>>, _>("locations").unwrap_or_default(),
        skills: row.get::<Option<Vec<String>>, _>("skills").unwrap_or_default(),
        min_salary: row.get("min_salary"),
        max_salary: row.get("max_salary"),
        employment_type: row
            .get::<Option<String>, _>("employment_type")
            .and_then(|s| employment_type_from_str(&s)),
        posted_at: row.get("posted_at"),
        freshness_score: row.get("freshness_score"),
        embedding: row
            .try_get::<Option<pgvector::Vector>, _>("embedding")
            .ok()
            .flatten()
            .map(|v| v.to_vec()),
        is_active: row.get("is_active"),
        last_verified_at: row.get("last_verified_at"),
        delisted_at: row.get("delisted_at"),
        delist_reason: row
            .get::<Option<String>, _>("delist_reason")
            .and_then(|s| delist_reason_from_str(&s)),
        enrich_failed_at: row.get("enrich_failed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn role_family_from_str(s: &str) -> RoleFamily {
    match s {
        "engineering" => RoleFamily::Engineering,
        "design" => RoleFamily::Design,
        "product" => RoleFamily::Product,
        "sales" => RoleFamily::Sales,
        "marketing" => RoleFamily::Marketing,
        "operations" => RoleFamily::Operations,
        "finance" => RoleFamily::Finance,
        "people" => RoleFamily::People,
        "legal" => RoleFamily::Legal,
        "customer_support" => RoleFamily::CustomerSupport,
        "data_science" => RoleFamily::DataScience,
        _ => RoleFamily::Other,
    }
}

fn seniority_from_str(s: &str) -> Option<Seniority> {
    Some(match s {
        "intern" => Seniority::Intern,
        "junior" => Seniority::Junior,
        "mid" => Seniority::Mid,
        "senior" => Seniority::Senior,
        "staff" => Seniority::Staff,
        "principal" => Seniority::Principal,
        "lead" => Seniority::Lead,
        "manager" => Seniority::Manager,
        "director" => Seniority::Director,
        "executive" => Seniority::Executive,
        _ => return None,
    })
}

fn location_type_from_str(s: &str) -> Option<LocationType> {
    Some(match s {
        "remote" => LocationType::Remote,
        "hybrid" => LocationType::Hybrid,
        "onsite" => LocationType::Onsite,
        _ => return None,
    })
}

fn employment_type_from_str(s: &str) -> Option<EmploymentType> {
    Some(match s {
        "full_time" => EmploymentType::FullTime,
        "part_time" => EmploymentType::PartTime,
        "contract" => EmploymentType::Contract,
        "internship" => EmploymentType::Internship,
        "temporary" => EmploymentType::Temporary,
        _ => return None,
    })
}

fn delist_reason_from_str(s: &str) -> Option<DelistReason> {
    Some(match s {
        "removed_from_ats" => DelistReason::RemovedFromAts,
        "company_inactive" => DelistReason::CompanyInactive,
        "page_not_found" => DelistReason::PageNotFound,
        _ => return None,
    })
}

fn run_record_from_row<Id: From<uuid::Uuid>>(row: &sqlx::postgres::PgRow) -> RunRecord<Id> {
    RunRecord {
        id: Id::from(row.get::<uuid::Uuid, _>("id")),
        label: row.get("label"),
        status: run_status_from_str(row.get("status")),
        counters: serde_json::from_value(row.get("counters")).unwrap_or_default(),
        current_step: row.get("current_step"),
        progress_count: row.get("progress_count"),
        progress_total: row.get("progress_total"),
        logs: serde_json::from_value(row.get("logs")).unwrap_or_default(),
        error_message: row.get("error_message"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

fn run_status_from_str(s: &str) -> RunStatus {
    match s {
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Running,
    }
}

macro_rules! insert_run {
    ($self:ident, $table:literal, $run:ident) => {{
        sqlx::query(concat!(
            "insert into ",
            $table,
            " (id, label, status, counters, current_step, progress_count, progress_total, logs, error_message, started_at, completed_at) ",
            "values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)"
        ))
        .bind($run.id.0)
        .bind(&$run.label)
        .bind($run.status.as_str())
        .bind(serde_json::to_value(&$run.counters).unwrap())
        .bind(&$run.current_step)
        .bind($run.progress_count)
        .bind($run.progress_total)
        .bind(serde_json::to_value(&$run.logs).unwrap())
        .bind(&$run.error_message)
        .bind($run.started_at)
        .bind($run.completed_at)
        .execute(&$self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok($run.id)
    }};
}

macro_rules! update_run {
    ($self:ident, $table:literal, $run:ident) => {{
        sqlx::query(concat!(
            "update ",
            $table,
            " set status=$2, counters=$3, current_step=$4, progress_count=$5, progress_total=$6, logs=$7, error_message=$8, completed_at=$9 where id=$1"
        ))
        .bind($run.id.0)
        .bind($run.status.as_str())
        .bind(serde_json::to_value(&$run.counters).unwrap())
        .bind(&$run.current_step)
        .bind($run.progress_count)
        .bind($run.progress_total)
        .bind(serde_json::to_value(&$run.logs).unwrap())
        .bind(&$run.error_message)
        .bind($run.completed_at)
        .execute(&$self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }};
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn get_company(&self, id: CompanyId) -> Result<Option<Company>, StorageError> {
        let row = sqlx::query("select * from companies where id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.as_ref().map(company_from_row))
    }

    async fn get_company_by_domain(&self, domain: &str) -> Result<Option<Company>, StorageError> {
        let normalized = crate::html_utils::normalize_domain(domain);
        let row = sqlx::query("select * from companies where lower(domain) = $1 or lower(domain) = concat('www.', $1)")
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.as_ref().map(company_from_row))
    }

    async fn insert_company(&self, company: Company) -> Result<Company, StorageError> {
        sqlx::query(
            "insert into companies (id, name, domain, careers_url, website_url, ats_family, ats_identifier, \
             parent_company_id, discovery_source, country, location, industry, employee_count, funding_stage, \
             crawl_priority, is_active, last_crawled_at, last_maintenance_at, last_crawled_for_network, \
             ats_detection_attempts, ats_detection_last_at, created_at) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)",
        )
        .bind(company.id.0)
        .bind(&company.name)
        .bind(&company.domain)
        .bind(&company.careers_url)
        .bind(&company.website_url)
        .bind(company.ats_family.map(|f| f.as_str()))
        .bind(&company.ats_identifier)
        .bind(company.parent_company_id.map(|id| id.0))
        .bind(company.discovery_source.map(|s| s.as_str()))
        .bind(&company.country)
        .bind(&company.location)
        .bind(&company.industry)
        .bind(company.employee_count)
        .bind(&company.funding_stage)
        .bind(company.crawl_priority)
        .bind(company.is_active)
        .bind(company.last_crawled_at)
        .bind(company.last_maintenance_at)
        .bind(company.last_crawled_for_network)
        .bind(company.ats_detection_attempts)
        .bind(company.ats_detection_last_at)
        .bind(company.created_at)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(company)
    }

    async fn update_company(&self, company: &Company) -> Result<(), StorageError> {
        sqlx::query(
            "update companies set name=$2, domain=$3, careers_url=$4, website_url=$5, ats_family=$6, \
             ats_identifier=$7, parent_company_id=$8, is_active=$9, last_crawled_at=$10, \
             last_maintenance_at=$11, last_crawled_for_network=$12, ats_detection_attempts=$13, \
             ats_detection_last_at=$14, crawl_priority=$15 where id=$1",
        )
        .bind(company.id.0)
        .bind(&company.name)
        .bind(&company.domain)
        .bind(&company.careers_url)
        .bind(&company.website_url)
        .bind(company.ats_family.map(|f| f.as_str()))
        .bind(&company.ats_identifier)
        .bind(company.parent_company_id.map(|id| id.0))
        .bind(company.is_active)
        .bind(company.last_crawled_at)
        .bind(company.last_maintenance_at)
        .bind(company.last_crawled_for_network)
        .bind(company.ats_detection_attempts)
        .bind(company.ats_detection_last_at)
        .bind(company.crawl_priority)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn list_companies_for_crawl(
        &self,
        family: Option<AtsFamily>,
        limit: i64,
    ) -> Result<Vec<Company>, StorageError> {
        let rows = sqlx::query(
            "select * from companies where is_active and careers_url is not null \
             and ($1::text is null or ats_family = $1) order by crawl_priority desc limit $2",
        )
        .bind(family.map(|f| f.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows.iter().map(company_from_row).collect())
    }

    async fn list_companies_for_maintenance(&self, limit: i64) -> Result<Vec<Company>, StorageError> {
        let rows = sqlx::query(
            "select * from companies where is_active and ats_family is not null \
             order by last_maintenance_at nulls first limit $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows.iter().map(company_from_row).collect())
    }

    async fn list_companies_for_network_crawl(&self, limit: i64) -> Result<Vec<Company>, StorageError> {
        let rows = sqlx::query(
            "select * from companies where is_active and last_crawled_for_network is null limit $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows.iter().map(company_from_row).collect())
    }

    async fn known_domains(&self) -> Result<Vec<String>, StorageError> {
        let mut domains: Vec<String> = sqlx::query("select domain from companies where domain is not null")
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?
            .iter()
            .map(|r| r.get("domain"))
            .collect();
        let queued: Vec<String> = sqlx::query("select domain from discovery_queue where domain is not null")
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?
            .iter()
            .map(|r| r.get("domain"))
            .collect();
        domains.extend(queued);
        Ok(domains)
    }

    async fn known_ats_pairs(&self) -> Result<Vec<(AtsFamily, String)>, StorageError> {
        let rows = sqlx::query(
            "select ats_family, ats_identifier from companies where ats_family is not null and ats_identifier is not null",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                let family = AtsFamily::from_str(r.get::<String, _>("ats_family").as_str()).ok()?;
                let identifier: String = r.get("ats_identifier");
                Some((family, identifier))
            })
            .collect())
    }

    async fn latest_snapshot(&self, company_id: CompanyId) -> Result<Option<CrawlSnapshot>, StorageError> {
        let row = sqlx::query(
            "select * from crawl_snapshots where company_id = $1 order by crawled_at desc limit 1",
        )
        .bind(company_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(row.map(|r| CrawlSnapshot {
            id: CrawlSnapshotId(r.get("id")),
            company_id: CompanyId(r.get("company_id")),
            url: r.get("url"),
            html_hash: ContentHash(r.get("html_hash")),
            html_content: r.get("html_content"),
            status_code: r.get::<Option<i32>, _>("status_code").map(|v| v as u16),
            rendered: r.get("rendered"),
            crawled_at: r.get("crawled_at"),
        }))
    }

    async fn insert_snapshot(&self, snapshot: CrawlSnapshot) -> Result<CrawlSnapshotId, StorageError> {
        sqlx::query(
            "insert into crawl_snapshots (id, company_id, url, html_hash, html_content, status_code, rendered, crawled_at) \
             values ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(snapshot.id.0)
        .bind(snapshot.company_id.0)
        .bind(&snapshot.url)
        .bind(&snapshot.html_hash.0)
        .bind(&snapshot.html_content)
        .bind(snapshot.status_code.map(|v| v as i32))
        .bind(snapshot.rendered)
        .bind(snapshot.crawled_at)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(snapshot.id)
    }

    async fn upsert_job_raw(&self, raw: JobRaw) -> Result<JobRawId, StorageError> {
        let row = sqlx::query(
            "insert into jobs_raw (id, company_id, source_url, title_raw, description_raw, location_raw, \
             department_raw, employment_type_raw, posted_at_raw, salary_raw, extracted_at) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
             on conflict (company_id, source_url) do update set \
             title_raw=excluded.title_raw, description_raw=excluded.description_raw, \
             location_raw=excluded.location_raw, department_raw=excluded.department_raw, \
             employment_type_raw=excluded.employment_type_raw, posted_at_raw=excluded.posted_at_raw, \
             salary_raw=excluded.salary_raw, extracted_at=excluded.extracted_at \
             returning id",
        )
        .bind(raw.id.0)
        .bind(raw.company_id.0)
        .bind(&raw.source_url)
        .bind(&raw.title_raw)
        .bind(&raw.description_raw)
        .bind(&raw.location_raw)
        .bind(&raw.department_raw)
        .bind(&raw.employment_type_raw)
        .bind(&raw.posted_at_raw)
        .bind(&raw.salary_raw)
        .bind(raw.extracted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(JobRawId(row.get("id")))
    }

    async fn upsert_job(&self, job: Job) -> Result<JobId, StorageError> {
        let row = sqlx::query(
            "insert into jobs (id, company_id, raw_job_id, title, description, source_url, role_family, \
             role_specialization, seniority, location_type, locations, skills, min_salary, max_salary, \
             employment_type, posted_at, freshness_score, is_active, last_verified_at, delisted_at, \
             delist_reason, enrich_failed_at, created_at, updated_at) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24) \
             on conflict (company_id, source_url) do update set \
             raw_job_id=excluded.raw_job_id, title=excluded.title, description=coalesce(jobs.description, excluded.description), \
             role_family=excluded.role_family, role_specialization=excluded.role_specialization, \
             seniority=excluded.seniority, location_type=excluded.location_type, locations=excluded.locations, \
             skills=excluded.skills, min_salary=excluded.min_salary, max_salary=excluded.max_salary, \
             employment_type=excluded.employment_type, posted_at=excluded.posted_at, \
             freshness_score=excluded.freshness_score, is_active=true, delisted_at=null, delist_reason=null, \
             updated_at=excluded.updated_at \
             returning id",
        )
        .bind(job.id.0)
        .bind(job.company_id.0)
        .bind(job.raw_job_id.map(|id| id.0))
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.source_url)
        .bind(job.role_family.as_str())
        .bind(&job.role_specialization)
        .bind(job.seniority.map(|s| s.as_str()))
        .bind(job.location_type.map(|l| l.as_str()))
        .bind(&job.locations)
        .bind(&job.skills)
        .bind(job.min_salary)
        .bind(job.max_salary)
        .bind(job.employment_type.map(|e| e.as_str()))
        .bind(job.posted_at)
        .bind(job.freshness_score)
        .bind(job.is_active)
        .bind(job.last_verified_at)
        .bind(job.delisted_at)
        .bind(job.delist_reason.map(|d| d.as_str()))
        .bind(job.enrich_failed_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(JobId(row.get("id")))
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query("select * from jobs where id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.as_ref().map(job_from_row))
    }

    async fn get_job_by_source_url(
        &self,
        company_id: CompanyId,
        source_url: &str,
    ) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query("select * from jobs where company_id = $1 and source_url = $2")
            .bind(company_id.0)
            .bind(source_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.as_ref().map(job_from_row))
    }

    async fn active_jobs_for_company(&self, company_id: CompanyId) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query("select * from jobs where company_id = $1 and is_active")
            .bind(company_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    async fn jobs_missing_description(&self, limit: i64) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query(
            "select * from jobs where is_active and description is null and enrich_failed_at is null \
             order by created_at limit $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    async fn jobs_missing_embedding(&self, limit: i64) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query(
            "select * from jobs where is_active and embedding is null order by created_at limit $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StorageError> {
        sqlx::query(
            "update jobs set title=$2, description=$3, role_family=$4, role_specialization=$5, \
             seniority=$6, location_type=$7, locations=$8, skills=$9, min_salary=$10, max_salary=$11, \
             employment_type=$12, posted_at=$13, freshness_score=$14, is_active=$15, last_verified_at=$16, \
             delisted_at=$17, delist_reason=$18, enrich_failed_at=$19, updated_at=$20 where id=$1",
        )
        .bind(job.id.0)
        .bind(&job.title)
        .bind(&job.description)
        .bind(job.role_family.as_str())
        .bind(&job.role_specialization)
        .bind(job.seniority.map(|s| s.as_str()))
        .bind(job.location_type.map(|l| l.as_str()))
        .bind(&job.locations)
        .bind(&job.skills)
        .bind(job.min_salary)
        .bind(job.max_salary)
        .bind(job.employment_type.map(|e| e.as_str()))
        .bind(job.posted_at)
        .bind(job.freshness_score)
        .bind(job.is_active)
        .bind(job.last_verified_at)
        .bind(job.delisted_at)
        .bind(job.delist_reason.map(|d| d.as_str()))
        .bind(job.enrich_failed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn update_job_embedding(&self, id: JobId, embedding: Vec<f32>) -> Result<(), StorageError> {
        sqlx::query("update jobs set embedding=$2, updated_at=now() where id=$1")
            .bind(id.0)
            .bind(pgvector::Vector::from(embedding))
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(())
    }

    async fn insert_discovery_queue_entry(
        &self,
        entry: DiscoveryQueueEntry,
    ) -> Result<DiscoveryQueueId, StorageError> {
        sqlx::query(
            "insert into discovery_queue (id, name, domain, careers_url, website_url, source, source_url, \
             location, country, description, industry, employee_count, funding_stage, ats_family, \
             ats_identifier, status, error_message, retry_count, created_at, processed_at, company_id) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)",
        )
        .bind(entry.id.0)
        .bind(&entry.name)
        .bind(&entry.domain)
        .bind(&entry.careers_url)
        .bind(&entry.website_url)
        .bind(entry.source.as_str())
        .bind(&entry.source_url)
        .bind(&entry.location)
        .bind(&entry.country)
        .bind(&entry.description)
        .bind(&entry.industry)
        .bind(entry.employee_count)
        .bind(&entry.funding_stage)
        .bind(entry.ats_family.map(|f| f.as_str()))
        .bind(&entry.ats_identifier)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.retry_count)
        .bind(entry.created_at)
        .bind(entry.processed_at)
        .bind(entry.company_id.map(|id| id.0))
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(entry.id)
    }

    /// `SKIP LOCKED` lets concurrent queue processors each claim a
    /// disjoint batch without blocking on one another.
    async fn claim_pending_discovery_entries(
        &self,
        limit: i64,
    ) -> Result<Vec<DiscoveryQueueEntry>, StorageError> {
        let rows = sqlx::query(
            "update discovery_queue set status = 'processing' where id in ( \
                select id from discovery_queue where status = 'pending' \
                order by created_at for update skip locked limit $1 \
             ) returning *",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(rows.iter().map(discovery_queue_entry_from_row).collect())
    }

    async fn update_discovery_queue_entry(&self, entry: &DiscoveryQueueEntry) -> Result<(), StorageError> {
        sqlx::query(
            "update discovery_queue set status=$2, error_message=$3, retry_count=$4, processed_at=$5, \
             company_id=$6, ats_family=$7, ats_identifier=$8, careers_url=$9 where id=$1",
        )
        .bind(entry.id.0)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.retry_count)
        .bind(entry.processed_at)
        .bind(entry.company_id.map(|id| id.0))
        .bind(entry.ats_family.map(|f| f.as_str()))
        .bind(&entry.ats_identifier)
        .bind(&entry.careers_url)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn set_discovery_queue_status(
        &self,
        id: DiscoveryQueueId,
        status: DiscoveryQueueStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("update discovery_queue set status=$2 where id=$1")
            .bind(id.0)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(())
    }

    async fn insert_discovery_run(&self, run: DiscoveryRun) -> Result<DiscoveryRunId, StorageError> {
        insert_run!(self, "discovery_runs", run)
    }

    async fn update_discovery_run(&self, run: &DiscoveryRun) -> Result<(), StorageError> {
        update_run!(self, "discovery_runs", run)
    }

    async fn get_discovery_run(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>, StorageError> {
        let row = sqlx::query("select * from discovery_runs where id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.as_ref().map(run_record_from_row::<DiscoveryRunId>))
    }

    async fn append_discovery_run_log(
        &self,
        id: DiscoveryRunId,
        entry: RunLogEntry,
    ) -> Result<(), StorageError> {
        sqlx::query("update discovery_runs set logs = logs || $2::jsonb where id = $1")
            .bind(id.0)
            .bind(serde_json::to_value(&[entry]).unwrap())
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(())
    }

    async fn insert_pipeline_run(&self, run: PipelineRun) -> Result<PipelineRunId, StorageError> {
        insert_run!(self, "pipeline_runs", run)
    }

    async fn update_pipeline_run(&self, run: &PipelineRun) -> Result<(), StorageError> {
        update_run!(self, "pipeline_runs", run)
    }

    async fn get_pipeline_run(&self, id: PipelineRunId) -> Result<Option<PipelineRun>, StorageError> {
        let row = sqlx::query("select * from pipeline_runs where id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.as_ref().map(run_record_from_row::<PipelineRunId>))
    }

    async fn append_pipeline_run_log(
        &self,
        id: PipelineRunId,
        entry: RunLogEntry,
    ) -> Result<(), StorageError> {
        sqlx::query("update pipeline_runs set logs = logs || $2::jsonb where id = $1")
            .bind(id.0)
            .bind(serde_json::to_value(&[entry]).unwrap())
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(())
    }

    async fn insert_maintenance_run(&self, run: MaintenanceRun) -> Result<MaintenanceRunId, StorageError> {
        insert_run!(self, "maintenance_runs", run)
    }

    async fn update_maintenance_run(&self, run: &MaintenanceRun) -> Result<(), StorageError> {
        update_run!(self, "maintenance_runs", run)
    }

    async fn insert_verification_run(&self, run: VerificationRun) -> Result<VerificationRunId, StorageError> {
        insert_run!(self, "verification_runs", run)
    }

    async fn update_verification_run(&self, run: &VerificationRun) -> Result<(), StorageError> {
        update_run!(self, "verification_runs", run)
    }

    async fn upsert_job_board_listing(&self, listing: JobBoardListing) -> Result<(), StorageError> {
        sqlx::query(
            "insert into job_board_listings (id, job_id, board, found, confidence, listing_url, \
             search_query, search_result_count, verified_at) values ($1,$2,$3,$4,$5,$6,$7,$8,$9) \
             on conflict (job_id, board) do update set found=excluded.found, confidence=excluded.confidence, \
             listing_url=excluded.listing_url, search_query=excluded.search_query, \
             search_result_count=excluded.search_result_count, verified_at=excluded.verified_at",
        )
        .bind(listing.id.0)
        .bind(listing.job_id.0)
        .bind(&listing.board)
        .bind(listing.found)
        .bind(listing.confidence)
        .bind(&listing.listing_url)
        .bind(&listing.search_query)
        .bind(listing.search_result_count)
        .bind(listing.verified_at)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }
}

fn discovery_queue_entry_from_row(row: &sqlx::postgres::PgRow) -> DiscoveryQueueEntry {
    DiscoveryQueueEntry {
        id: DiscoveryQueueId(row.get("id")),
        name: row.get("name"),
        domain: row.get("domain"),
        careers_url: row.get("careers_url"),
        website_url: row.get("website_url"),
        source: discovery_source_from_str(row.get("source")).unwrap_or(DiscoverySourceKind::AtsDirectory),
        source_url: row.get("source_url"),
        location: row.get("location"),
        country: row.get("country"),
        description: row.get("description"),
        industry: row.get("industry"),
        employee_count: row.get("employee_count"),
        funding_stage: row.get("funding_stage"),
        ats_family: row
            .get::<Option<String>, _>("ats_family")
            .and_then(|s| AtsFamily::from_str(&s).ok()),
        ats_identifier: row.get("ats_identifier"),
        status: discovery_queue_status_from_str(row.get("status")),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        created_at: row.get("created_at"),
        processed_at: row.get("processed_at"),
        company_id: row.get::<Option<uuid::Uuid>, _>("company_id").map(CompanyId),
    }
}

fn discovery_queue_status_from_str(s: &str) -> DiscoveryQueueStatus {
    match s {
        "processing" => DiscoveryQueueStatus::Processing,
        "completed" => DiscoveryQueueStatus::Completed,
        "failed" => DiscoveryQueueStatus::Failed,
        "skipped" => DiscoveryQueueStatus::Skipped,
        "review" => DiscoveryQueueStatus::Review,
        _ => DiscoveryQueueStatus::Pending,
    }
}
