//! Job aggregators source. Scrapes remote-job-board listing
//! pages and Hacker News "Who Is Hiring" threads (via the HN Firebase
//! API), extracting ATS-embed URLs with per-family regexes from the
//! shared ATS Registry.

use crate::ats::registry;
use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::models::{AtsFamily, DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;

const HN_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";

pub struct JobAggregatorSource {
    listing_urls: Vec<String>,
    /// A "Who Is Hiring" story id, if this run should also crawl HN.
    hn_thread_id: Option<u64>,
}

impl JobAggregatorSource {
    pub fn new(listing_urls: Vec<String>, hn_thread_id: Option<u64>) -> Self {
        Self { listing_urls, hn_thread_id }
    }
}

#[async_trait]
impl DiscoverySource for JobAggregatorSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::JobAggregator
    }

    fn name(&self) -> &str {
        "job_aggregator"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        let mut seen = HashSet::new();
        progress.set_total((self.listing_urls.len() + 1) as i64);

        for url in &self.listing_urls {
            progress.increment();
            let outcome = ctx.fetcher.fetch(url).await?;
            let Some(body) = outcome.body else { continue };
            let html = String::from_utf8_lossy(&body);
            for candidate in extract_embeds(&html, url) {
                emit_if_new(ctx, tx, self.kind(), candidate, &mut seen).await?;
            }
        }

        if let Some(story_id) = self.hn_thread_id {
            progress.increment();
            self.crawl_hn_thread(ctx, tx, story_id, &mut seen).await?;
        }
        Ok(())
    }
}

impl JobAggregatorSource {
    async fn crawl_hn_thread(
        &self,
        ctx: &SourceContext,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
        story_id: u64,
        seen: &mut HashSet<String>,
    ) -> Result<(), DiscoveryError> {
        let story_url = format!("{HN_API_BASE}/item/{story_id}.json");
        let outcome = ctx.fetcher.fetch(&story_url).await?;
        let Some(body) = outcome.body else { return Ok(()) };
        let Ok(story) = serde_json::from_slice::<Value>(&body) else { return Ok(()) };
        let Some(kids) = story.get("kids").and_then(|v| v.as_array()) else { return Ok(()) };

        for kid in kids {
            let Some(id) = kid.as_u64() else { continue };
            let comment_url = format!("{HN_API_BASE}/item/{id}.json");
            let outcome = ctx.fetcher.fetch(&comment_url).await?;
            let Some(body) = outcome.body else { continue };
            let Ok(comment) = serde_json::from_slice::<Value>(&body) else { continue };
            let Some(text) = comment.get("text").and_then(|v| v.as_str()) else { continue };
            let decoded = html_utils::decode_entities(text);
            for candidate in extract_embeds(&decoded, &comment_url) {
                emit_if_new(ctx, tx, self.kind(), candidate, seen).await?;
            }
        }
        Ok(())
    }
}

async fn emit_if_new(
    ctx: &SourceContext,
    tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    kind: DiscoverySourceKind,
    candidate: DiscoveredCompany,
    seen: &mut HashSet<String>,
) -> Result<(), DiscoveryError> {
    let Some(identifier) = &candidate.ats_identifier else { return Ok(()) };
    let key = format!("{:?}:{}", candidate.ats_family, identifier.to_lowercase());
    if !seen.insert(key) {
        return Ok(());
    }
    if let Some(family) = candidate.ats_family {
        if ctx.dedup.is_duplicate_ats_pair(family, identifier).await {
            return Ok(());
        }
    }
    let _ = tx.send((kind, candidate)).await;
    Ok(())
}

/// Scans `text` for any registry family's URL or embed patterns,
/// emitting one candidate per distinct `(family, identifier)` match.
fn extract_embeds(text: &str, source_url: &str) -> Vec<DiscoveredCompany> {
    let mut out = Vec::new();
    for entry in registry::registry() {
        for pattern in entry.url_patterns.iter().chain(entry.embed_patterns.iter()) {
            for cap in pattern.captures_iter(text) {
                let Some(identifier) = cap.get(1) else { continue };
                let identifier = identifier.as_str().to_string();
                if !entry.identifier_is_valid(&identifier) {
                    continue;
                }
                out.push(candidate_from_match(entry.family, &identifier, source_url));
            }
        }
    }
    out
}

fn candidate_from_match(family: AtsFamily, identifier: &str, source_url: &str) -> DiscoveredCompany {
    let careers_url = registry::entry_for(family)
        .map(|e| e.careers_url_for(identifier))
        .unwrap_or_default();
    DiscoveredCompany {
        name: identifier.to_string(),
        careers_url: Some(careers_url),
        ats_family: Some(family),
        ats_identifier: Some(identifier.to_string()),
        source_url: Some(source_url.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_greenhouse_embed_from_comment_text() {
        let text = "We're hiring! Apply at https://boards.greenhouse.io/acme/jobs/123";
        let candidates = extract_embeds(text, "https://news.ycombinator.com/item?id=1");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].ats_family, Some(AtsFamily::Greenhouse));
        assert_eq!(candidates[0].ats_identifier.as_deref(), Some("acme"));
    }

    #[test]
    fn ignores_blocklisted_identifiers() {
        let text = "Job board embed at https://jobs.lever.co/js/embed";
        let candidates = extract_embeds(text, "https://example.com");
        assert!(candidates.is_empty());
    }
}
