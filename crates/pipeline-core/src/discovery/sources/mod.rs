//! Concrete Discovery Sources. Every producer is pluggable
//! and optional; the Orchestrator constructs and holds whichever it's
//! configured to run.

pub mod accelerator;
pub mod ats_directory;
pub mod ats_prober;
pub mod funding_news;
pub mod github_orgs;
pub mod google_search;
pub mod job_aggregator;
pub mod network_crawler;

pub use accelerator::AcceleratorSource;
pub use ats_directory::AtsDirectorySource;
pub use ats_prober::AtsProberSource;
pub use funding_news::FundingNewsSource;
pub use github_orgs::GithubOrgsSource;
pub use google_search::{GoogleSearchMode, GoogleSearchSource};
pub use job_aggregator::JobAggregatorSource;
pub use network_crawler::NetworkCrawlerSource;
