//! Pipeline Orchestrator. Composes Discovery → Crawl →
//! Enrich → Embed under the `full_pipeline` operation key, and exposes
//! each stage standalone under its own key so per-family crawl/enrich
//! shards can run concurrently with each other and with `full_pipeline`.

use crate::crawl::{crawl_companies, CrawlEngine};
use crate::discovery::{DiscoveryOrchestrator, DiscoverySource};
use crate::embeddings::EmbeddingEngine;
use crate::enrichment::{enrich_jobs, EnrichmentEngine};
use crate::error::OrchestratorError;
use crate::models::{AtsFamily, DiscoveryRun, PipelineRun, RunLogLevel, RunStatus};
use crate::operation_registry::{
    crawl_key, enrich_key, OperationRegistry, DISCOVERY_KEY, EMBEDDINGS_KEY, FULL_PIPELINE_KEY,
};
use crate::storage::Storage;
use std::sync::Arc;
use tracing::info;

/// Per-invocation knobs for `run_full_pipeline`, mirroring the
/// `POST /admin/pipeline/run` request body: any stage can be
/// skipped without touching the others' operation keys.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunOptions {
    pub skip_discovery: bool,
    pub skip_crawl: bool,
    pub skip_enrichment: bool,
    pub skip_embeddings: bool,
}

/// Large batches are processed in this many items per iteration.
const BATCH_UNIT: i64 = 500;

/// Defensive cap on how many batches a single stage run will iterate
/// before giving up, so a non-converging selection (e.g. enrichment
/// repeatedly re-selecting the same un-enrichable jobs) cannot spin
/// forever. Real workloads exhaust well under this.
const MAX_BATCHES: usize = 200;

pub struct PipelineOrchestrator {
    storage: Arc<dyn Storage>,
    registry: Arc<OperationRegistry>,
    discovery: Arc<DiscoveryOrchestrator>,
    crawl_engine: Arc<CrawlEngine>,
    enrichment_engine: Arc<EnrichmentEngine>,
    embedding_engine: Arc<EmbeddingEngine>,
    crawl_concurrency: usize,
    enrich_concurrency: usize,
    embedding_concurrency: usize,
}

impl PipelineOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<OperationRegistry>,
        discovery: Arc<DiscoveryOrchestrator>,
        crawl_engine: Arc<CrawlEngine>,
        enrichment_engine: Arc<EnrichmentEngine>,
        embedding_engine: Arc<EmbeddingEngine>,
        crawl_concurrency: usize,
        enrich_concurrency: usize,
        embedding_concurrency: usize,
    ) -> Self {
        Self {
            storage,
            registry,
            discovery,
            crawl_engine,
            enrichment_engine,
            embedding_engine,
            crawl_concurrency,
            enrich_concurrency,
            embedding_concurrency,
        }
    }

    /// Runs Discovery → Crawl(all) → Enrich(all) → Embed sequentially
    /// inside the single `full_pipeline` key. Does not block the
    /// per-stage keys (`crawl_all`, `enrich_greenhouse`, ...), which
    /// remain free for standalone runs to use concurrently.
    pub async fn run_full_pipeline(
        &self,
        sources: Vec<Arc<dyn DiscoverySource>>,
    ) -> Result<PipelineRun, OrchestratorError> {
        self.run_full_pipeline_with_options(sources, PipelineRunOptions::default())
            .await
    }

    /// Same as `run_full_pipeline` but honors the per-stage skip flags
    /// from `POST /admin/pipeline/run`'s request body.
    pub async fn run_full_pipeline_with_options(
        &self,
        sources: Vec<Arc<dyn DiscoverySource>>,
        options: PipelineRunOptions,
    ) -> Result<PipelineRun, OrchestratorError> {
        let Some(guard) = self.registry.start(FULL_PIPELINE_KEY).await else {
            return Err(OrchestratorError::AlreadyRunning {
                key: FULL_PIPELINE_KEY.to_string(),
            });
        };

        let mut run = PipelineRun::start("full_pipeline");
        let run_id = self.storage.insert_pipeline_run(run.clone()).await?;
        run.id = run_id;

        if options.skip_discovery {
            run.log(RunLogLevel::Info, "discovery stage skipped");
        } else {
            run.current_step = Some("discovery".to_string());
            self.storage.update_pipeline_run(&run).await?;
            info!(pipeline_run_id = %run.id, "full pipeline: discovery starting");
            match self.discovery.run(sources).await {
                Ok(discovery_run) => {
                    run.counters.discovered += discovery_run.counters.discovered;
                    run.counters.new += discovery_run.counters.new;
                    run.counters.duplicates += discovery_run.counters.duplicates;
                    run.counters.non_us += discovery_run.counters.non_us;
                    run.counters.errors += discovery_run.counters.errors;
                    run.log(RunLogLevel::Info, "discovery stage completed");
                }
                Err(e) => {
                    run.log(RunLogLevel::Error, format!("discovery stage failed: {e}"));
                }
            }
        }
        self.storage.update_pipeline_run(&run).await?;

        if self.cancelled(&run).await? {
            return self.finish(run, RunStatus::Cancelled, guard).await;
        }

        if options.skip_crawl {
            run.log(RunLogLevel::Info, "crawl stage skipped");
        } else {
            run.current_step = Some("crawl".to_string());
            self.storage.update_pipeline_run(&run).await?;
            self.run_crawl_batches(&mut run, None).await?;
        }

        if self.cancelled(&run).await? {
            return self.finish(run, RunStatus::Cancelled, guard).await;
        }

        if options.skip_enrichment {
            run.log(RunLogLevel::Info, "enrich stage skipped");
        } else {
            run.current_step = Some("enrich".to_string());
            self.storage.update_pipeline_run(&run).await?;
            self.run_enrich_batches(&mut run).await?;
        }

        if self.cancelled(&run).await? {
            return self.finish(run, RunStatus::Cancelled, guard).await;
        }

        if options.skip_embeddings {
            run.log(RunLogLevel::Info, "embeddings stage skipped");
        } else {
            run.current_step = Some("embeddings".to_string());
            self.storage.update_pipeline_run(&run).await?;
            self.run_embedding_batches(&mut run).await?;
        }

        self.finish(run, RunStatus::Completed, guard).await
    }

    /// Standalone Discovery under its own `discovery` key,
    /// independent of `full_pipeline` and every crawl/enrich shard.
    pub async fn run_discovery_standalone(
        &self,
        sources: Vec<Arc<dyn DiscoverySource>>,
    ) -> Result<DiscoveryRun, OrchestratorError> {
        let Some(guard) = self.registry.start(DISCOVERY_KEY).await else {
            return Err(OrchestratorError::AlreadyRunning {
                key: DISCOVERY_KEY.to_string(),
            });
        };
        let result = self.discovery.run(sources).await;
        guard.release().await;
        Ok(result?)
    }

    pub async fn run_crawl_standalone(
        &self,
        family: Option<AtsFamily>,
    ) -> Result<PipelineRun, OrchestratorError> {
        let key = crawl_key(family);
        let Some(guard) = self.registry.start(key.clone()).await else {
            return Err(OrchestratorError::AlreadyRunning { key });
        };
        let mut run = PipelineRun::start(key);
        let run_id = self.storage.insert_pipeline_run(run.clone()).await?;
        run.id = run_id;
        self.run_crawl_batches(&mut run, family).await?;
        self.finish(run, RunStatus::Completed, guard).await
    }

    pub async fn run_enrich_standalone(
        &self,
        family: Option<AtsFamily>,
    ) -> Result<PipelineRun, OrchestratorError> {
        let key = enrich_key(family);
        let Some(guard) = self.registry.start(key.clone()).await else {
            return Err(OrchestratorError::AlreadyRunning { key });
        };
        let mut run = PipelineRun::start(key);
        let run_id = self.storage.insert_pipeline_run(run.clone()).await?;
        run.id = run_id;
        self.run_enrich_batches_for(&mut run, family).await?;
        self.finish(run, RunStatus::Completed, guard).await
    }

    pub async fn run_embeddings_standalone(&self) -> Result<PipelineRun, OrchestratorError> {
        let Some(guard) = self.registry.start(EMBEDDINGS_KEY).await else {
            return Err(OrchestratorError::AlreadyRunning {
                key: EMBEDDINGS_KEY.to_string(),
            });
        };
        let mut run = PipelineRun::start(EMBEDDINGS_KEY);
        let run_id = self.storage.insert_pipeline_run(run.clone()).await?;
        run.id = run_id;
        self.run_embedding_batches(&mut run).await?;
        self.finish(run, RunStatus::Completed, guard).await
    }

    async fn run_crawl_batches(
        &self,
        run: &mut PipelineRun,
        family: Option<AtsFamily>,
    ) -> Result<(), OrchestratorError> {
        for batch_no in 0..MAX_BATCHES {
            if self.cancelled(run).await? {
                return Ok(());
            }
            let companies = self
                .storage
                .list_companies_for_crawl(family, BATCH_UNIT)
                .await?;
            if companies.is_empty() {
                break;
            }
            let batch_len = companies.len();
            let ids: Vec<_> = companies.iter().map(|c| c.id).collect();
            let results = crawl_companies(self.crawl_engine.clone(), ids, self.crawl_concurrency).await;

            let mut succeeded = 0i64;
            let mut failed = 0i64;
            for (_, result) in &results {
                match result {
                    Ok(_) => succeeded += 1,
                    Err(_) => failed += 1,
                }
            }
            run.counters.new += succeeded;
            run.counters.errors += failed;
            run.progress_count += batch_len as i64;
            run.log(
                RunLogLevel::Info,
                format!("crawl batch {batch_no}: {succeeded} ok, {failed} failed, {batch_len} companies"),
            );
            self.storage.update_pipeline_run(run).await?;

            if batch_len < BATCH_UNIT as usize {
                break;
            }
        }
        Ok(())
    }

    async fn run_enrich_batches(&self, run: &mut PipelineRun) -> Result<(), OrchestratorError> {
        self.run_enrich_batches_for(run, None).await
    }

    /// As `run_enrich_batches`, but restricted to jobs whose Company is
    /// on the given ATS family — backs the `enrich_<family>` shard key
    ///, which must be able to run concurrently with other
    /// families' shards over the same missing-description queue.
    async fn run_enrich_batches_for(
        &self,
        run: &mut PipelineRun,
        family: Option<AtsFamily>,
    ) -> Result<(), OrchestratorError> {
        for batch_no in 0..MAX_BATCHES {
            if self.cancelled(run).await? {
                return Ok(());
            }
            let mut jobs = self.storage.jobs_missing_description(BATCH_UNIT).await?;
            let fetched_len = jobs.len();
            if let Some(family) = family {
                let mut filtered = Vec::with_capacity(jobs.len());
                for job in jobs {
                    let company = self.storage.get_company(job.company_id).await?;
                    if company.map(|c| c.ats_family) == Some(Some(family)) {
                        filtered.push(job);
                    }
                }
                jobs = filtered;
            }
            if jobs.is_empty() {
                // When shard-filtered, an unfiltered batch that is entirely
                // off-family will look identical on the next fetch (the
                // query has no notion of "already considered"); looping
                // would just replay it, so this family's queue is treated
                // as drained rather than retried.
                break;
            }
            let batch_len = jobs.len();
            let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
            let results = enrich_jobs(self.enrichment_engine.clone(), ids, self.enrich_concurrency).await;

            let mut succeeded = 0i64;
            let mut failed = 0i64;
            for (_, result) in &results {
                match result {
                    Ok(_) => succeeded += 1,
                    Err(_) => failed += 1,
                }
            }
            run.counters.new += succeeded;
            run.counters.errors += failed;
            run.progress_count += batch_len as i64;
            run.log(
                RunLogLevel::Info,
                format!("enrich batch {batch_no}: {succeeded} ok, {failed} failed, {batch_len} jobs"),
            );
            self.storage.update_pipeline_run(run).await?;

            if fetched_len < BATCH_UNIT as usize {
                break;
            }
        }
        Ok(())
    }

    async fn run_embedding_batches(&self, run: &mut PipelineRun) -> Result<(), OrchestratorError> {
        for batch_no in 0..MAX_BATCHES {
            if self.cancelled(run).await? {
                return Ok(());
            }
            let stats = self
                .embedding_engine
                .embed_missing(BATCH_UNIT, self.embedding_concurrency)
                .await?;
            if stats.attempted == 0 {
                break;
            }
            run.counters.new += stats.succeeded as i64;
            run.counters.errors += stats.failed as i64;
            run.progress_count += stats.attempted as i64;
            run.log(
                RunLogLevel::Info,
                format!(
                    "embedding batch {batch_no}: {} ok, {} failed, {} attempted",
                    stats.succeeded, stats.failed, stats.attempted
                ),
            );
            self.storage.update_pipeline_run(run).await?;

            if stats.attempted < BATCH_UNIT as usize {
                break;
            }
        }
        Ok(())
    }

    /// Re-reads the run from storage to pick up an operator-issued
    /// cancellation ("check status == cancelled at the top
    /// of each batch").
    async fn cancelled(&self, run: &PipelineRun) -> Result<bool, OrchestratorError> {
        let latest = self.storage.get_pipeline_run(run.id).await?;
        Ok(latest.map(|r| r.is_cancelled()).unwrap_or(false))
    }

    async fn finish(
        &self,
        mut run: PipelineRun,
        status: RunStatus,
        guard: crate::operation_registry::OperationGuard,
    ) -> Result<PipelineRun, OrchestratorError> {
        // A cancellation recorded after our last read wins over our
        // own verdict; never resurrect a cancelled run as completed.
        if let Some(latest) = self.storage.get_pipeline_run(run.id).await? {
            if latest.is_cancelled() {
                run.finish(RunStatus::Cancelled);
                self.storage.update_pipeline_run(&run).await?;
                guard.release().await;
                return Ok(run);
            }
        }
        run.finish(status);
        self.storage.update_pipeline_run(&run).await?;
        info!(pipeline_run_id = %run.id, status = %run.status, "pipeline run finished");
        guard.release().await;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DeduplicationService;
    use crate::discovery::DiscoveryOrchestrator;
    use crate::http_fetcher::HttpFetcher;
    use crate::rate_limiter::RateLimiter;
    use crate::storage::memory::MemoryStorage;
    use openai_client::OpenAIClient;

    fn test_orchestrator(storage: Arc<MemoryStorage>) -> PipelineOrchestrator {
        let rate_limiter = Arc::new(RateLimiter::new(Default::default()));
        let fetcher = Arc::new(HttpFetcher::new(
            "test-agent",
            std::time::Duration::from_secs(5),
            rate_limiter,
        ));
        let dedup = Arc::new(DeduplicationService::new());
        let discovery = Arc::new(DiscoveryOrchestrator::new(
            storage.clone(),
            dedup,
            fetcher.clone(),
            false,
        ));
        let crawl_engine = Arc::new(CrawlEngine::new(fetcher.clone(), storage.clone(), None, 14.0));
        let enrichment_engine = Arc::new(EnrichmentEngine::new(fetcher.clone(), storage.clone()));
        let openai = Arc::new(OpenAIClient::new("test-key"));
        let embedding_engine = Arc::new(EmbeddingEngine::new(openai, storage.clone(), "text-embedding-3-small"));
        PipelineOrchestrator::new(
            storage,
            Arc::new(OperationRegistry::new()),
            discovery,
            crawl_engine,
            enrichment_engine,
            embedding_engine,
            4,
            4,
            4,
        )
    }

    #[tokio::test]
    async fn full_pipeline_runs_with_no_companies_and_completes() {
        let storage = Arc::new(MemoryStorage::new());
        let orchestrator = test_orchestrator(storage);
        let run = orchestrator.run_full_pipeline(vec![]).await.unwrap();
        assert!(matches!(run.status, RunStatus::Completed));
    }

    #[tokio::test]
    async fn full_pipeline_rejects_concurrent_invocation() {
        let storage = Arc::new(MemoryStorage::new());
        let orchestrator = Arc::new(test_orchestrator(storage));
        let guard = orchestrator.registry.start(FULL_PIPELINE_KEY).await.unwrap();
        let result = orchestrator.run_full_pipeline(vec![]).await;
        assert!(matches!(result, Err(OrchestratorError::AlreadyRunning { .. })));
        guard.release().await;
    }

    #[tokio::test]
    async fn crawl_standalone_and_enrich_standalone_use_distinct_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let orchestrator = test_orchestrator(storage);
        let crawl_guard = orchestrator.registry.start(crawl_key(None)).await;
        assert!(crawl_guard.is_some());
        let enrich_run = orchestrator.run_enrich_standalone(None).await.unwrap();
        assert!(matches!(enrich_run.status, RunStatus::Completed));
        crawl_guard.unwrap().release().await;
    }
}
