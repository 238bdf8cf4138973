//! Wires the leaf components into the `PipelineOrchestrator`
//! and holds the `Arc`s axum handlers need. Constructed once at boot
//! in `bin/server.rs`, cloned cheaply per request.

use std::sync::Arc;

use pipeline_core::config::PipelineConfig;
use pipeline_core::crawl::CrawlEngine;
use pipeline_core::dedup::DeduplicationService;
use pipeline_core::discovery::sources::{
    AcceleratorSource, AtsDirectorySource, AtsProberSource, FundingNewsSource,
    GithubOrgsSource, GoogleSearchMode, GoogleSearchSource, JobAggregatorSource,
    NetworkCrawlerSource,
};
use pipeline_core::discovery::{DiscoveryOrchestrator, DiscoverySource};
use pipeline_core::embeddings::EmbeddingEngine;
use pipeline_core::enrichment::EnrichmentEngine;
use pipeline_core::extractors::llm::LlmExtractor;
use pipeline_core::http_fetcher::{Fetcher, HttpFetcher};
use pipeline_core::operation_registry::OperationRegistry;
use pipeline_core::pipeline_orchestrator::PipelineOrchestrator;
use pipeline_core::rate_limiter::RateLimiter;
use pipeline_core::storage::postgres::PostgresStorage;
use pipeline_core::storage::Storage;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PipelineConfig>,
    pub storage: Arc<dyn Storage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub discovery: Arc<DiscoveryOrchestrator>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub db_pool: PgPool,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: PipelineConfig) -> Self {
        let config = Arc::new(config);
        let storage: Arc<dyn Storage> = Arc::new(PostgresStorage::new(db_pool.clone()));

        let rate_limiter = Arc::new(
            RateLimiter::new(config.rate_limit_min_delay)
                .with_host_overrides(config.rate_limit_host_overrides.clone()),
        );
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
            &config.http_user_agent,
            config.http_timeout,
            rate_limiter,
        ));

        let dedup = Arc::new(DeduplicationService::new());
        let discovery = Arc::new(DiscoveryOrchestrator::new(
            storage.clone(),
            dedup,
            fetcher.clone(),
            config.us_only_filter,
        ));

        let llm = Arc::new(LlmExtractor::new(
            openai_client::OpenAIClient::new(config.llm_api_key.clone()),
            config.llm_model.clone(),
        ));
        let crawl_engine = Arc::new(CrawlEngine::new(
            fetcher.clone(),
            storage.clone(),
            Some(llm),
            config.freshness_half_life_days,
        ));
        let enrichment_engine = Arc::new(EnrichmentEngine::new(fetcher.clone(), storage.clone()));
        let openai = Arc::new(openai_client::OpenAIClient::new(config.embedding_api_key.clone()));
        let embedding_engine = Arc::new(EmbeddingEngine::new(
            openai,
            storage.clone(),
            config.embedding_model.clone(),
        ));

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            storage.clone(),
            Arc::new(OperationRegistry::new()),
            discovery.clone(),
            crawl_engine,
            enrichment_engine,
            embedding_engine,
            config.crawl_concurrency,
            config.enrich_concurrency,
            config.embedding_concurrency,
        ));

        Self {
            config,
            storage,
            fetcher,
            discovery,
            orchestrator,
            db_pool,
        }
    }

    /// The Discovery Sources a `full_pipeline`/standalone-discovery run
    /// fans out over. Sources that need operator-supplied
    /// credentials (Google Custom Search, GitHub token-gated search) are
    /// only included once their configuration is present.
    pub fn default_sources(&self) -> Vec<Arc<dyn DiscoverySource>> {
        let mut sources: Vec<Arc<dyn DiscoverySource>> = vec![
            Arc::new(AtsDirectorySource::new(seed_ats_slugs())),
            Arc::new(AcceleratorSource::new(vec![
                "https://www.ycombinator.com/companies".to_string(),
            ])),
            Arc::new(FundingNewsSource::new(seed_funding_feeds())),
            Arc::new(JobAggregatorSource::new(seed_job_boards(), None)),
            Arc::new(NetworkCrawlerSource::new(
                self.config.maintenance_batch_size,
                self.config.network_crawler_concurrency,
                self.config.path_check_concurrency,
            )),
            Arc::new(AtsProberSource::new(
                self.config.maintenance_batch_size,
                self.config.ats_prober_concurrency,
            )),
            Arc::new(GithubOrgsSource::new(
                vec!["location:\"San Francisco\"".to_string(), "location:\"New York\"".to_string()],
                seed_us_locations(),
            )),
        ];

        if let (Some(key), Some(cx)) = (&self.config.google_api_key, &self.config.google_cx) {
            let keywords = vec![
                "raises funding".to_string(),
                "Series A".to_string(),
                "Series B".to_string(),
            ];
            sources.push(Arc::new(GoogleSearchSource::new(
                GoogleSearchMode::Discovery(keywords),
                key.clone(),
                cx.clone(),
            )));
        }

        sources
    }
}

fn seed_ats_slugs() -> Vec<String> {
    Vec::new()
}

fn seed_funding_feeds() -> Vec<String> {
    vec![
        "https://techcrunch.com/tag/funding/feed/".to_string(),
        "https://www.businesswire.com/portal/site/home/news/industries/?vnsId=31381".to_string(),
    ]
}

fn seed_job_boards() -> Vec<String> {
    vec!["https://weworkremotely.com/remote-jobs".to_string()]
}

fn seed_us_locations() -> Vec<String> {
    vec![
        "San Francisco".to_string(),
        "New York".to_string(),
        "Austin".to_string(),
        "Seattle".to_string(),
        "Boston".to_string(),
    ]
}
