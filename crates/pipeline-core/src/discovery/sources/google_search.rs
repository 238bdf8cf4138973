//! Google Custom Search source. Manual-only and cost-gated
//! (never part of a scheduled run — the Orchestrator only runs it
//! when an operator explicitly includes it). Two modes: "ats fallback"
//! finds the ATS for a named company; "discovery" runs funding- and
//! industry-keyword queries for new companies.

use crate::ats::registry;
use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::models::{DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub struct AtsFallbackTarget {
    pub company_name: String,
    pub domain: Option<String>,
}

pub enum GoogleSearchMode {
    AtsFallback(Vec<AtsFallbackTarget>),
    Discovery(Vec<String>),
}

pub struct GoogleSearchSource {
    mode: GoogleSearchMode,
    api_key: String,
    cx: String,
}

impl GoogleSearchSource {
    pub fn new(mode: GoogleSearchMode, api_key: String, cx: String) -> Self {
        Self { mode, api_key, cx }
    }

    async fn search(&self, ctx: &SourceContext, query: &str) -> Result<Vec<Value>, DiscoveryError> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
            self.api_key,
            self.cx,
            percent_encode(query)
        );
        let outcome = ctx.fetcher.fetch(&url).await?;
        let Some(body) = outcome.body else { return Ok(Vec::new()) };
        let Ok(value) = serde_json::from_slice::<Value>(&body) else { return Ok(Vec::new()) };
        Ok(value
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl DiscoverySource for GoogleSearchSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::GoogleSearch
    }

    fn name(&self) -> &str {
        "google_search"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        match &self.mode {
            GoogleSearchMode::AtsFallback(targets) => {
                progress.set_total(targets.len() as i64);
                for target in targets {
                    progress.increment();
                    let query = format!(
                        "\"{}\" careers (greenhouse.io OR lever.co OR ashbyhq.com OR workable.com)",
                        target.company_name
                    );
                    let items = self.search(ctx, &query).await?;
                    if let Some(candidate) = find_ats_match(&items, target) {
                        if tx.send((self.kind(), candidate)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
            GoogleSearchMode::Discovery(queries) => {
                progress.set_total(queries.len() as i64);
                for query in queries {
                    progress.increment();
                    let items = self.search(ctx, query).await?;
                    for item in &items {
                        let Some(candidate) = candidate_from_result(item) else { continue };
                        let Some(domain) = &candidate.domain else { continue };
                        if ctx.dedup.is_duplicate_domain(domain).await {
                            continue;
                        }
                        if tx.send((self.kind(), candidate)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn find_ats_match(items: &[Value], target: &AtsFallbackTarget) -> Option<DiscoveredCompany> {
    for item in items {
        let link = item.get("link").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
        let haystack = format!("{link} {snippet}");
        for entry in registry::registry() {
            for pattern in &entry.url_patterns {
                if let Some(cap) = pattern.captures(&haystack) {
                    let Some(identifier) = cap.get(1) else { continue };
                    let identifier = identifier.as_str().to_string();
                    if !entry.identifier_is_valid(&identifier) {
                        continue;
                    }
                    return Some(DiscoveredCompany {
                        name: target.company_name.clone(),
                        domain: target.domain.clone(),
                        careers_url: Some(entry.careers_url_for(&identifier)),
                        ats_family: Some(entry.family),
                        ats_identifier: Some(identifier),
                        source_url: Some(link.to_string()),
                        ..Default::default()
                    });
                }
            }
        }
    }
    None
}

fn candidate_from_result(item: &Value) -> Option<DiscoveredCompany> {
    let link = item.get("link").and_then(|v| v.as_str())?;
    let title = item.get("title").and_then(|v| v.as_str()).unwrap_or(link);
    let snippet = item.get("snippet").and_then(|v| v.as_str());
    let domain = html_utils::domain_from_url(link)?;
    Some(DiscoveredCompany {
        name: title.to_string(),
        domain: Some(domain),
        website_url: Some(link.to_string()),
        source_url: Some(link.to_string()),
        description: snippet.map(|s| s.to_string()),
        ..Default::default()
    })
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encode_handles_quotes_and_spaces() {
        assert_eq!(percent_encode("\"Acme Inc\" careers"), "%22Acme+Inc%22+careers");
    }

    #[test]
    fn finds_ats_match_from_result_link() {
        let items = vec![serde_json::json!({
            "link": "https://boards.greenhouse.io/acme",
            "snippet": "Acme Inc careers page"
        })];
        let target = AtsFallbackTarget { company_name: "Acme Inc".to_string(), domain: Some("acme.com".to_string()) };
        let candidate = find_ats_match(&items, &target).unwrap();
        assert_eq!(candidate.ats_identifier.as_deref(), Some("acme"));
    }
}
