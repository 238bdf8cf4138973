//! End-to-end: two independent sources emit the same company at the
//! same time; the orchestrator's admission rule must let exactly one
//! through regardless of which source's task happens to win the race.

use async_trait::async_trait;
use pipeline_core::dedup::DeduplicationService;
use pipeline_core::discovery::{DiscoveryOrchestrator, DiscoverySource, ProgressTracker, SourceContext};
use pipeline_core::error::DiscoveryError;
use pipeline_core::http_fetcher::StubFetcher;
use pipeline_core::models::{DiscoveredCompany, DiscoverySourceKind};
use pipeline_core::storage::memory::MemoryStorage;
use std::sync::Arc;
use tokio::sync::mpsc;

struct SingleEmitSource {
    kind: DiscoverySourceKind,
}

#[async_trait]
impl DiscoverySource for SingleEmitSource {
    fn kind(&self) -> DiscoverySourceKind {
        self.kind
    }

    fn name(&self) -> &str {
        "single_emit"
    }

    async fn discover(
        &self,
        _ctx: &SourceContext,
        _progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        let candidate = DiscoveredCompany {
            name: "Acme Robotics".to_string(),
            domain: Some("acme.com".to_string()),
            careers_url: Some("https://acme.com/careers".to_string()),
            ..Default::default()
        };
        tx.send((self.kind(), candidate)).await.ok();
        Ok(())
    }
}

#[tokio::test]
async fn concurrent_sources_emitting_the_same_company_admit_only_once() {
    let storage = Arc::new(MemoryStorage::new());
    let dedup = Arc::new(DeduplicationService::new());
    let fetcher: Arc<StubFetcher> = Arc::new(StubFetcher::new());
    let orchestrator = DiscoveryOrchestrator::new(storage.clone(), dedup, fetcher, false);

    let sources: Vec<Arc<dyn DiscoverySource>> = vec![
        Arc::new(SingleEmitSource { kind: DiscoverySourceKind::FundingNews }),
        Arc::new(SingleEmitSource { kind: DiscoverySourceKind::JobAggregator }),
        Arc::new(SingleEmitSource { kind: DiscoverySourceKind::GoogleSearch }),
    ];

    let run = orchestrator.run(sources).await.unwrap();
    assert_eq!(run.counters.discovered, 3);
    assert_eq!(run.counters.new, 1);
    assert_eq!(run.counters.duplicates, 2);

    use pipeline_core::storage::Storage;
    let company = storage.get_company_by_domain("acme.com").await.unwrap();
    assert!(company.is_some());
}
