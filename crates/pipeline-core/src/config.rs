//! Pipeline-wide configuration loaded from the environment. Everything
//! tunable — freshness half-life, the role-family table, the US-only
//! filter — is a field here, not a hard-wired constant.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub embedding_api_key: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub embedding_model: String,

    /// Present only when the Google Custom Search source is wired in
    /// ("manual only; cost-gated") — absent by default.
    pub google_api_key: Option<String>,
    pub google_cx: Option<String>,

    pub http_user_agent: String,
    pub http_timeout: Duration,

    /// Minimum inter-call delay per host, seconds.
    pub rate_limit_min_delay: Duration,
    pub rate_limit_host_overrides: HashMap<String, Duration>,

    /// Detection attempts before a Company is marked `ats_family=custom`.
    pub ats_detection_ceiling: i32,

    /// Off by default, so non-U.S. postings are kept unless an
    /// operator opts into filtering them at discovery admission time.
    pub us_only_filter: bool,

    pub freshness_half_life_days: f64,

    pub crawl_concurrency: usize,
    pub enrich_concurrency: usize,
    pub embedding_concurrency: usize,
    pub network_crawler_concurrency: usize,
    pub path_check_concurrency: usize,
    pub ats_prober_concurrency: usize,

    pub enrich_batch_size: i64,
    pub maintenance_batch_size: i64,
    pub embedding_batch_size: i64,

    pub pipeline_interval: Duration,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            embedding_api_key: env::var("EMBEDDING_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .context("EMBEDDING_API_KEY or OPENAI_API_KEY must be set")?,
            llm_api_key: env::var("LLM_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .context("LLM_API_KEY or OPENAI_API_KEY must be set")?,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),

            google_api_key: env::var("GOOGLE_API_KEY").ok(),
            google_cx: env::var("GOOGLE_CX").ok(),

            http_user_agent: env::var("HTTP_USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (compatible; TalentSignalBot/1.0; +https://talentsignal.example/bot)"
                    .to_string()
            }),
            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            ),

            rate_limit_min_delay: Duration::from_millis(
                (env::var("RATE_LIMIT_MIN_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.5)
                    * 1000.0) as u64,
            ),
            rate_limit_host_overrides: HashMap::new(),

            ats_detection_ceiling: env::var("ATS_DETECTION_CEILING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            us_only_filter: env::var("US_ONLY_FILTER")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),

            freshness_half_life_days: env::var("FRESHNESS_HALF_LIFE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14.0),

            crawl_concurrency: env::var("CRAWL_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            enrich_concurrency: env::var("ENRICH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            embedding_concurrency: env::var("EMBEDDING_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            network_crawler_concurrency: env::var("NETWORK_CRAWLER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            path_check_concurrency: env::var("PATH_CHECK_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            ats_prober_concurrency: env::var("ATS_PROBER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),

            enrich_batch_size: env::var("ENRICH_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            maintenance_batch_size: env::var("MAINTENANCE_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            embedding_batch_size: env::var("EMBEDDING_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),

            pipeline_interval: Duration::from_secs(
                env::var("PIPELINE_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(6 * 60 * 60),
            ),
        })
    }

    pub fn min_delay_for_host(&self, host: &str) -> Duration {
        self.rate_limit_host_overrides
            .get(host)
            .copied()
            .unwrap_or(self.rate_limit_min_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_override_falls_back_to_default() {
        let mut cfg = PipelineConfig {
            database_url: String::new(),
            embedding_api_key: String::new(),
            llm_api_key: String::new(),
            llm_model: String::new(),
            embedding_model: String::new(),
            google_api_key: None,
            google_cx: None,
            http_user_agent: String::new(),
            http_timeout: Duration::from_secs(20),
            rate_limit_min_delay: Duration::from_millis(500),
            rate_limit_host_overrides: HashMap::new(),
            ats_detection_ceiling: 3,
            us_only_filter: false,
            freshness_half_life_days: 14.0,
            crawl_concurrency: 8,
            enrich_concurrency: 10,
            embedding_concurrency: 10,
            network_crawler_concurrency: 10,
            path_check_concurrency: 10,
            ats_prober_concurrency: 20,
            enrich_batch_size: 500,
            maintenance_batch_size: 500,
            embedding_batch_size: 500,
            pipeline_interval: Duration::from_secs(6 * 60 * 60),
        };
        assert_eq!(
            cfg.min_delay_for_host("boards-api.greenhouse.io"),
            Duration::from_millis(500)
        );
        cfg.rate_limit_host_overrides
            .insert("boards-api.greenhouse.io".to_string(), Duration::from_millis(200));
        assert_eq!(
            cfg.min_delay_for_host("boards-api.greenhouse.io"),
            Duration::from_millis(200)
        );
        assert_eq!(
            cfg.min_delay_for_host("other.example.com"),
            Duration::from_millis(500)
        );
    }
}
