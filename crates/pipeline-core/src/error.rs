//! Per-component error taxonomy. Each component owns one enum rather than
//! a single crate-wide catch-all so callers can match on it directly
//! against a component's own reason codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("non-2xx status {status} from {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render request to {url} timed out")]
    Timeout { url: String },
    #[error("render failed for {url}: {reason}")]
    Failed { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no signal matched any known ATS family")]
    NoMatch,
    #[error("fetch failed during detection: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed response body: {0}")]
    Malformed(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("LLM extraction fallback failed: {0}")]
    Llm(String),
}

/// Reason codes surfaced into the crawl run log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlFailureReason {
    NoCareersUrl,
    FetchFailed,
    FetchFailedAfterRediscovery,
    NotFound,
    Exception,
}

impl CrawlFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlFailureReason::NoCareersUrl => "no_careers_url",
            CrawlFailureReason::FetchFailed => "fetch_failed",
            CrawlFailureReason::FetchFailedAfterRediscovery => "fetch_failed_after_rediscovery",
            CrawlFailureReason::NotFound => "not_found",
            CrawlFailureReason::Exception => "exception",
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("company is inactive or has no careers url")]
    NoCareersUrl,
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("fetch failed after rediscovery retry")]
    FetchFailedAfterRediscovery,
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CrawlError {
    pub fn reason(&self) -> CrawlFailureReason {
        match self {
            CrawlError::NoCareersUrl => CrawlFailureReason::NoCareersUrl,
            CrawlError::Fetch(e) if e.is_not_found() => CrawlFailureReason::NotFound,
            CrawlError::Fetch(_) => CrawlFailureReason::FetchFailed,
            CrawlError::Render(_) => CrawlFailureReason::FetchFailed,
            CrawlError::FetchFailedAfterRediscovery => {
                CrawlFailureReason::FetchFailedAfterRediscovery
            }
            CrawlError::Extract(_) => CrawlFailureReason::FetchFailed,
            CrawlError::Storage(_) => CrawlFailureReason::Exception,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no enrichment path known for this job")]
    NoPath,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum MaintainError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider call failed: {0}")]
    Provider(#[from] anyhow::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("operation '{key}' is already running")]
    AlreadyRunning { key: String },
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source {source_name} failed to initialize: {reason}")]
    InitializeFailed { source_name: String, reason: String },
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    #[error("unique constraint violated on {constraint}")]
    UniqueViolation { constraint: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }
}
