//! ATS Directories source. Probes candidate slugs against
//! each known ATS vendor's careers-URL template with bounded-
//! parallelism HEAD requests; a 200 yields a candidate.

use crate::ats::registry;
use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::models::{AtsFamily, DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Curated candidate slugs are supplied by the caller, whether sourced
/// from an aggregator scrape or a sitemap — this source leaves the
/// supply mechanism open. A slug is tried against every family in
/// `families` that carries a `careers_url_template`.
pub struct AtsDirectorySource {
    candidate_slugs: Vec<String>,
    families: Vec<AtsFamily>,
    concurrency: usize,
}

impl AtsDirectorySource {
    pub fn new(candidate_slugs: Vec<String>) -> Self {
        Self {
            candidate_slugs,
            families: registry::registry().iter().map(|e| e.family).collect(),
            concurrency: 20,
        }
    }

    pub fn with_families(mut self, families: Vec<AtsFamily>) -> Self {
        self.families = families;
        self
    }
}

#[async_trait]
impl DiscoverySource for AtsDirectorySource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::AtsDirectory
    }

    fn name(&self) -> &str {
        "ats_directory"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        let probes: Vec<(AtsFamily, String)> = self
            .families
            .iter()
            .flat_map(|family| self.candidate_slugs.iter().map(move |slug| (*family, slug.clone())))
            .collect();
        progress.set_total(probes.len() as i64);

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::new();
        for (family, slug) in probes {
            let Some(entry) = registry::entry_for(family) else { continue };
            if !entry.identifier_is_valid(&slug) {
                continue;
            }
            let careers_url = entry.careers_url_for(&slug);
            let fetcher = ctx.fetcher.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = fetcher.head(&careers_url).await;
                (family, slug, careers_url, outcome)
            }));
        }

        for handle in handles {
            let Ok((family, slug, careers_url, outcome)) = handle.await else { continue };
            progress.increment();
            let Ok(outcome) = outcome else { continue };
            if outcome.status >= 200 && outcome.status < 300 {
                if ctx.dedup.is_duplicate_ats_pair(family, &slug).await {
                    continue;
                }
                let candidate = DiscoveredCompany {
                    name: slug.clone(),
                    careers_url: Some(careers_url),
                    ats_family: Some(family),
                    ats_identifier: Some(slug),
                    ..Default::default()
                };
                if tx.send((self.kind(), candidate)).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_list_spans_every_registry_family() {
        let source = AtsDirectorySource::new(vec!["acme".to_string()]);
        assert_eq!(source.families.len(), registry::registry().len());
    }
}
