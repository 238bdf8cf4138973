//! The Deduplication Service, an in-memory set of known
//! domains plus known `(ats_family, identifier)` pairs, hydrated from
//! storage at orchestrator start and consulted by every Discovery
//! Source before emission. Append-only during a run — entries are
//! never removed mid-run.

use crate::models::AtsFamily;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-wide, owned once by the Pipeline/Discovery Orchestrator and
/// shared by reference — not a singleton.
#[derive(Default)]
pub struct DeduplicationService {
    domains: RwLock<HashSet<String>>,
    ats_pairs: RwLock<HashSet<(AtsFamily, String)>>,
}

impl DeduplicationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the service from storage: existing Company domains, queued
    /// domains, and existing `(family, identifier)` pairs.
    pub async fn hydrate(
        &self,
        known_domains: impl IntoIterator<Item = String>,
        known_ats_pairs: impl IntoIterator<Item = (AtsFamily, String)>,
    ) {
        let mut domains = self.domains.write().await;
        for domain in known_domains {
            domains.insert(Self::normalize(&domain));
        }
        drop(domains);

        let mut pairs = self.ats_pairs.write().await;
        for (family, identifier) in known_ats_pairs {
            pairs.insert((family, identifier.to_lowercase()));
        }
    }

    /// Domains are treated case-insensitively and a leading `www.` is
    /// ignored.
    fn normalize(domain: &str) -> String {
        crate::html_utils::normalize_domain(domain)
    }

    pub async fn is_duplicate_domain(&self, domain: &str) -> bool {
        self.domains.read().await.contains(&Self::normalize(domain))
    }

    pub async fn is_duplicate_ats_pair(&self, family: AtsFamily, identifier: &str) -> bool {
        self.ats_pairs
            .read()
            .await
            .contains(&(family, identifier.to_lowercase()))
    }

    /// Marks a domain known immediately, before the row insert commits,
    /// so concurrent sources never race each other into a duplicate
    /// insert. Returns `true` if this call was the one that
    /// newly claimed the domain — `false` if another caller beat it.
    pub async fn mark_domain(&self, domain: &str) -> bool {
        let normalized = Self::normalize(domain);
        let mut domains = self.domains.write().await;
        let was_new = domains.insert(normalized.clone());
        if was_new {
            debug!(domain = %normalized, "dedup: claimed new domain");
        }
        was_new
    }

    pub async fn mark_ats_pair(&self, family: AtsFamily, identifier: &str) {
        self.ats_pairs
            .write()
            .await
            .insert((family, identifier.to_lowercase()));
    }

    pub async fn domain_count(&self) -> usize {
        self.domains.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hydrate_normalizes_case_and_www_prefix() {
        let dedup = DeduplicationService::new();
        dedup.hydrate(vec!["WWW.Acme.com".to_string()], vec![]).await;
        assert!(dedup.is_duplicate_domain("acme.com").await);
        assert!(dedup.is_duplicate_domain("www.ACME.COM").await);
    }

    #[tokio::test]
    async fn mark_domain_is_idempotent_and_reports_first_claimant() {
        let dedup = DeduplicationService::new();
        assert!(dedup.mark_domain("acme.com").await);
        assert!(!dedup.mark_domain("acme.com").await);
        assert!(!dedup.mark_domain("WWW.acme.com").await);
    }

    #[tokio::test]
    async fn ats_pair_dedup_is_independent_of_domain_dedup() {
        let dedup = DeduplicationService::new();
        dedup
            .hydrate(vec![], vec![(AtsFamily::Greenhouse, "Acme".to_string())])
            .await;
        assert!(dedup.is_duplicate_ats_pair(AtsFamily::Greenhouse, "acme").await);
        assert!(!dedup.is_duplicate_ats_pair(AtsFamily::Lever, "acme").await);
    }

    #[tokio::test]
    async fn never_emits_same_domain_twice_under_concurrency() {
        use std::sync::Arc;
        let dedup = Arc::new(DeduplicationService::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let dedup = dedup.clone();
            handles.push(tokio::spawn(async move { dedup.mark_domain("acme.com").await }));
        }
        let results: Vec<bool> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results.iter().filter(|&&won| won).count(), 1);
    }
}
