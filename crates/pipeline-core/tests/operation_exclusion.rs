//! End-to-end: the Operation Registry serializes standalone crawl runs
//! under the `crawl_all` key so two invocations never run concurrently.
//! The guard is acquired by the test itself before the orchestrator is
//! built, which makes the rejection deterministic instead of depending
//! on a scheduling race.

use pipeline_core::crawl::CrawlEngine;
use pipeline_core::dedup::DeduplicationService;
use pipeline_core::discovery::DiscoveryOrchestrator;
use pipeline_core::embeddings::EmbeddingEngine;
use pipeline_core::enrichment::EnrichmentEngine;
use pipeline_core::error::OrchestratorError;
use pipeline_core::http_fetcher::StubFetcher;
use pipeline_core::models::RunStatus;
use pipeline_core::operation_registry::{crawl_key, OperationRegistry};
use pipeline_core::pipeline_orchestrator::PipelineOrchestrator;
use pipeline_core::storage::memory::MemoryStorage;
use std::sync::Arc;

fn orchestrator_with_registry(
    storage: Arc<MemoryStorage>,
    registry: Arc<OperationRegistry>,
) -> PipelineOrchestrator {
    let fetcher: Arc<StubFetcher> = Arc::new(StubFetcher::new());
    let dedup = Arc::new(DeduplicationService::new());
    let discovery = Arc::new(DiscoveryOrchestrator::new(
        storage.clone(),
        dedup,
        fetcher.clone(),
        false,
    ));
    let crawl_engine = Arc::new(CrawlEngine::new(fetcher.clone(), storage.clone(), None, 14.0));
    let enrichment_engine = Arc::new(EnrichmentEngine::new(fetcher, storage.clone()));
    let openai = Arc::new(openai_client::OpenAIClient::new("test-key"));
    let embedding_engine = Arc::new(EmbeddingEngine::new(openai, storage.clone(), "text-embedding-3-small"));
    PipelineOrchestrator::new(
        storage,
        registry,
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
async fn concurrent_crawl_standalone_calls_are_rejected_not_queued() {
    let storage = Arc::new(MemoryStorage::new());
    let registry = Arc::new(OperationRegistry::new());

    // Hold the key the orchestrator itself would acquire, simulating an
    // already-running `crawl_all` operation.
    let guard = registry.start(crawl_key(None)).await.unwrap();

    let orchestrator = orchestrator_with_registry(storage, registry);
    let result = orchestrator.run_crawl_standalone(None).await;
    match result {
        Err(OrchestratorError::AlreadyRunning { key }) => assert_eq!(key, "crawl_all"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    guard.release().await;
    let run = orchestrator.run_crawl_standalone(None).await.unwrap();
    assert!(matches!(run.status, RunStatus::Completed));
}
