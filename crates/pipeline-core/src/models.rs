//! Persisted entities shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Newtype id, monotonic (`Uuid::now_v7`) so storage indexes stay
/// roughly insertion-ordered.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(CompanyId);
id_type!(CrawlSnapshotId);
id_type!(JobRawId);
id_type!(JobId);
id_type!(DiscoveryQueueId);
id_type!(DiscoveryRunId);
id_type!(PipelineRunId);
id_type!(MaintenanceRunId);
id_type!(VerificationRunId);
id_type!(JobBoardListingId);

/// SHA-256 over newline-normalized content (trim each line, drop blanks),
/// used for crawl-snapshot change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub Vec<u8>);

impl ContentHash {
    pub fn from_content(content: &str) -> Self {
        let normalized = normalize_content(content);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hasher.finalize().to_vec())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

fn normalize_content(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One of roughly thirty ATS backends the Registry knows how to detect.
/// `Custom` means "give up detecting, route through the JS-render path" —
/// distinct from "not yet detected" (`Company::ats_family == None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtsFamily {
    Greenhouse,
    Lever,
    Ashby,
    Workable,
    BambooHr,
    SmartRecruiters,
    JazzHr,
    BreezyHr,
    Recruitee,
    Personio,
    Teamtailor,
    Workday,
    Icims,
    SuccessFactors,
    Paylocity,
    AdpWorkforceNow,
    Jobvite,
    /// Careers page redirects to a distinct registrable domain that is
    /// itself not a recognized ATS host — the identifier is that domain.
    UsesParentAts,
    /// Detection ceiling reached; route to the headless-render path.
    Custom,
}

impl AtsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtsFamily::Greenhouse => "greenhouse",
            AtsFamily::Lever => "lever",
            AtsFamily::Ashby => "ashby",
            AtsFamily::Workable => "workable",
            AtsFamily::BambooHr => "bamboohr",
            AtsFamily::SmartRecruiters => "smartrecruiters",
            AtsFamily::JazzHr => "jazzhr",
            AtsFamily::BreezyHr => "breezyhr",
            AtsFamily::Recruitee => "recruitee",
            AtsFamily::Personio => "personio",
            AtsFamily::Teamtailor => "teamtailor",
            AtsFamily::Workday => "workday",
            AtsFamily::Icims => "icims",
            AtsFamily::SuccessFactors => "successfactors",
            AtsFamily::Paylocity => "paylocity",
            AtsFamily::AdpWorkforceNow => "adp_workforce_now",
            AtsFamily::Jobvite => "jobvite",
            AtsFamily::UsesParentAts => "uses_parent_ats",
            AtsFamily::Custom => "custom",
        }
    }

    /// Families with a dedicated JSON-API `Extractor`/`Enricher`; every
    /// other family falls through to the generic HTML/JSON-LD path.
    pub fn has_dedicated_extractor(&self) -> bool {
        matches!(
            self,
            AtsFamily::Greenhouse | AtsFamily::Lever | AtsFamily::Ashby | AtsFamily::Workable
        )
    }
}

impl fmt::Display for AtsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AtsFamily {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "greenhouse" => AtsFamily::Greenhouse,
            "lever" => AtsFamily::Lever,
            "ashby" => AtsFamily::Ashby,
            "workable" => AtsFamily::Workable,
            "bamboohr" => AtsFamily::BambooHr,
            "smartrecruiters" => AtsFamily::SmartRecruiters,
            "jazzhr" => AtsFamily::JazzHr,
            "breezyhr" => AtsFamily::BreezyHr,
            "recruitee" => AtsFamily::Recruitee,
            "personio" => AtsFamily::Personio,
            "teamtailor" => AtsFamily::Teamtailor,
            "workday" => AtsFamily::Workday,
            "icims" => AtsFamily::Icims,
            "successfactors" => AtsFamily::SuccessFactors,
            "paylocity" => AtsFamily::Paylocity,
            "adp_workforce_now" => AtsFamily::AdpWorkforceNow,
            "jobvite" => AtsFamily::Jobvite,
            "uses_parent_ats" => AtsFamily::UsesParentAts,
            "custom" => AtsFamily::Custom,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleFamily {
    Engineering,
    Design,
    Product,
    Sales,
    Marketing,
    Operations,
    Finance,
    People,
    Legal,
    CustomerSupport,
    DataScience,
    Other,
}

impl RoleFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleFamily::Engineering => "engineering",
            RoleFamily::Design => "design",
            RoleFamily::Product => "product",
            RoleFamily::Sales => "sales",
            RoleFamily::Marketing => "marketing",
            RoleFamily::Operations => "operations",
            RoleFamily::Finance => "finance",
            RoleFamily::People => "people",
            RoleFamily::Legal => "legal",
            RoleFamily::CustomerSupport => "customer_support",
            RoleFamily::DataScience => "data_science",
            RoleFamily::Other => "other",
        }
    }
}

impl fmt::Display for RoleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seniority {
    Intern,
    Junior,
    Mid,
    Senior,
    Staff,
    Principal,
    Lead,
    Manager,
    Director,
    Executive,
}

impl Seniority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Seniority::Intern => "intern",
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
            Seniority::Staff => "staff",
            Seniority::Principal => "principal",
            Seniority::Lead => "lead",
            Seniority::Manager => "manager",
            Seniority::Director => "director",
            Seniority::Executive => "executive",
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    Remote,
    Hybrid,
    Onsite,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Remote => "remote",
            LocationType::Hybrid => "hybrid",
            LocationType::Onsite => "onsite",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "full_time",
            EmploymentType::PartTime => "part_time",
            EmploymentType::Contract => "contract",
            EmploymentType::Internship => "internship",
            EmploymentType::Temporary => "temporary",
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoverySourceKind {
    AtsDirectory,
    Accelerator,
    FundingNews,
    JobAggregator,
    NetworkCrawler,
    AtsProber,
    GoogleSearch,
}

impl DiscoverySourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySourceKind::AtsDirectory => "ats_directory",
            DiscoverySourceKind::Accelerator => "accelerator",
            DiscoverySourceKind::FundingNews => "funding_news",
            DiscoverySourceKind::JobAggregator => "job_aggregator",
            DiscoverySourceKind::NetworkCrawler => "network_crawler",
            DiscoverySourceKind::AtsProber => "ats_prober",
            DiscoverySourceKind::GoogleSearch => "google_search",
        }
    }
}

impl fmt::Display for DiscoverySourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryQueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
    Review,
}

impl DiscoveryQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryQueueStatus::Pending => "pending",
            DiscoveryQueueStatus::Processing => "processing",
            DiscoveryQueueStatus::Completed => "completed",
            DiscoveryQueueStatus::Failed => "failed",
            DiscoveryQueueStatus::Skipped => "skipped",
            DiscoveryQueueStatus::Review => "review",
        }
    }
}

impl fmt::Display for DiscoveryQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelistReason {
    RemovedFromAts,
    CompanyInactive,
    PageNotFound,
}

impl DelistReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelistReason::RemovedFromAts => "removed_from_ats",
            DelistReason::CompanyInactive => "company_inactive",
            DelistReason::PageNotFound => "page_not_found",
        }
    }
}

impl fmt::Display for DelistReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured log line appended to a run record. Committed
/// immediately on append so an operator UI can tail progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub ts: DateTime<Utc>,
    pub level: RunLogLevel,
    pub msg: String,
    pub data: Option<serde_json::Value>,
}

impl RunLogEntry {
    pub fn new(level: RunLogLevel, msg: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            level,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub discovered: i64,
    pub new: i64,
    pub duplicates: i64,
    pub errors: i64,
    pub non_us: i64,
    /// Discovery breaks these down per `DiscoverySourceKind::as_str()`
    /// as well, since the operator UI needs to see which source is
    /// producing duplicates vs. new companies. Other run kinds leave
    /// this empty.
    #[serde(default)]
    pub by_source: std::collections::HashMap<String, SourceCounters>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SourceCounters {
    pub discovered: i64,
    pub new: i64,
    pub duplicates: i64,
    pub errors: i64,
    pub non_us: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub domain: Option<String>,
    pub careers_url: Option<String>,
    pub website_url: Option<String>,
    pub ats_family: Option<AtsFamily>,
    pub ats_identifier: Option<String>,
    pub parent_company_id: Option<CompanyId>,
    pub discovery_source: Option<DiscoverySourceKind>,
    pub country: Option<String>,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i32>,
    pub funding_stage: Option<String>,
    pub crawl_priority: i32,
    pub is_active: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_maintenance_at: Option<DateTime<Utc>>,
    pub last_crawled_for_network: Option<DateTime<Utc>>,
    pub ats_detection_attempts: i32,
    pub ats_detection_last_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CompanyId::new(),
            name: name.into(),
            domain: None,
            careers_url: None,
            website_url: None,
            ats_family: None,
            ats_identifier: None,
            parent_company_id: None,
            discovery_source: None,
            country: None,
            location: None,
            industry: None,
            employee_count: None,
            funding_stage: None,
            crawl_priority: 0,
            is_active: true,
            last_crawled_at: None,
            last_maintenance_at: None,
            last_crawled_for_network: None,
            ats_detection_attempts: 0,
            ats_detection_last_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSnapshot {
    pub id: CrawlSnapshotId,
    pub company_id: CompanyId,
    pub url: String,
    pub html_hash: ContentHash,
    pub html_content: Option<String>,
    pub status_code: Option<u16>,
    pub rendered: bool,
    pub crawled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRaw {
    pub id: JobRawId,
    pub company_id: CompanyId,
    pub source_url: String,
    pub title_raw: String,
    pub description_raw: Option<String>,
    pub location_raw: Option<String>,
    pub department_raw: Option<String>,
    pub employment_type_raw: Option<String>,
    pub posted_at_raw: Option<String>,
    pub salary_raw: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub company_id: CompanyId,
    pub raw_job_id: Option<JobRawId>,
    pub title: String,
    pub description: Option<String>,
    pub source_url: String,
    pub role_family: RoleFamily,
    pub role_specialization: Option<String>,
    pub seniority: Option<Seniority>,
    pub location_type: Option<LocationType>,
    pub locations: Vec<String>,
    pub skills: Vec<String>,
    pub min_salary: Option<i64>,
    pub max_salary: Option<i64>,
    pub employment_type: Option<EmploymentType>,
    pub posted_at: Option<DateTime<Utc>>,
    pub freshness_score: Option<f32>,
    pub embedding: Option<Vec<f32>>,
    pub is_active: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub delisted_at: Option<DateTime<Utc>>,
    pub delist_reason: Option<DelistReason>,
    pub enrich_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Delist in place; `is_active=false` is the only representation of
    /// "removed" — rows are never deleted.
    pub fn delist(&mut self, reason: DelistReason) {
        self.is_active = false;
        self.delisted_at = Some(Utc::now());
        self.delist_reason = Some(reason);
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryQueueEntry {
    pub id: DiscoveryQueueId,
    pub name: String,
    pub domain: Option<String>,
    pub careers_url: Option<String>,
    pub website_url: Option<String>,
    pub source: DiscoverySourceKind,
    pub source_url: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i32>,
    pub funding_stage: Option<String>,
    pub ats_family: Option<AtsFamily>,
    pub ats_identifier: Option<String>,
    pub status: DiscoveryQueueStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub company_id: Option<CompanyId>,
}

/// Shared shape for `DiscoveryRun` / `PipelineRun` / `MaintenanceRun` /
/// `VerificationRun` — all four need identical log/counter shapes, so
/// a single generic aggregate backs all four run kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord<Id> {
    pub id: Id,
    /// Discovery source name, pipeline stage name, or similar.
    pub label: String,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub current_step: Option<String>,
    pub progress_count: i64,
    pub progress_total: Option<i64>,
    pub logs: Vec<RunLogEntry>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl<Id: Default> RunRecord<Id> {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            id: Id::default(),
            label: label.into(),
            status: RunStatus::Running,
            counters: RunCounters::default(),
            current_step: None,
            progress_count: 0,
            progress_total: None,
            logs: Vec::new(),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn log(&mut self, level: RunLogLevel, msg: impl Into<String>) {
        self.logs.push(RunLogEntry::new(level, msg));
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled)
    }
}

pub type DiscoveryRun = RunRecord<DiscoveryRunId>;
pub type PipelineRun = RunRecord<PipelineRunId>;
pub type MaintenanceRun = RunRecord<MaintenanceRunId>;
pub type VerificationRun = RunRecord<VerificationRunId>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBoardListing {
    pub id: JobBoardListingId,
    pub job_id: JobId,
    pub board: String,
    pub found: bool,
    pub confidence: f32,
    pub listing_url: Option<String>,
    pub search_query: Option<String>,
    pub search_result_count: Option<i32>,
    pub verified_at: DateTime<Utc>,
}

/// A partially-populated discovery emission before admission filtering.
/// Which concrete table it becomes — a new `Company` row or a queued
/// `DiscoveryQueueEntry` — resolves at admission time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveredCompany {
    pub name: String,
    pub domain: Option<String>,
    pub careers_url: Option<String>,
    pub website_url: Option<String>,
    pub source_url: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i32>,
    pub funding_stage: Option<String>,
    pub ats_family: Option<AtsFamily>,
    pub ats_identifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_ignores_whitespace_shuffling() {
        let a = ContentHash::from_content("  hello \n\nworld  \n");
        let b = ContentHash::from_content("hello\nworld");
        assert_eq!(a, b);
    }

    #[test]
    fn ats_family_round_trips_through_str() {
        for family in [
            AtsFamily::Greenhouse,
            AtsFamily::Lever,
            AtsFamily::Ashby,
            AtsFamily::Workable,
            AtsFamily::Custom,
            AtsFamily::UsesParentAts,
        ] {
            let s = family.as_str();
            assert_eq!(s.parse::<AtsFamily>().unwrap(), family);
        }
    }

    #[test]
    fn delist_sets_all_three_fields() {
        let mut job = Job {
            id: JobId::new(),
            company_id: CompanyId::new(),
            raw_job_id: None,
            title: "Engineer".into(),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        job.delist(DelistReason::RemovedFromAts);
        assert!(!job.is_active);
        assert!(job.delisted_at.is_some());
        assert_eq!(job.delist_reason, Some(DelistReason::RemovedFromAts));
    }
}
