//! Funding news source. Fetches RSS/Atom feeds, keeps
//! items with funding keywords, extracts company names by regex
//! templates, dedupes.

use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::models::{DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tokio::sync::mpsc;

lazy_static! {
    static ref FUNDING_KEYWORDS: Regex =
        Regex::new(r"(?i)\b(raises?|raised|funding|series [a-e]|seed round|secures? \$)").unwrap();
    // "Acme raises $12 million" / "Acme Inc. raised $5M in seed funding"
    static ref RAISES_TEMPLATE: Regex = Regex::new(
        r"(?i)^([A-Z][\w.&'\- ]{1,60}?)\s+(?:raises?|raised|secures?|lands?)\s+\$"
    ).unwrap();
    static ref FUNDING_STAGE: Regex =
        Regex::new(r"(?i)(series [a-e]|seed round|seed funding|pre-seed)").unwrap();
}

pub struct FundingNewsSource {
    feed_urls: Vec<String>,
}

impl FundingNewsSource {
    pub fn new(feed_urls: Vec<String>) -> Self {
        Self { feed_urls }
    }
}

#[async_trait]
impl DiscoverySource for FundingNewsSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::FundingNews
    }

    fn name(&self) -> &str {
        "funding_news"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        progress.set_total(self.feed_urls.len() as i64);
        let mut seen_names = HashSet::new();

        for feed_url in &self.feed_urls {
            progress.increment();
            let outcome = ctx.fetcher.fetch(feed_url).await?;
            let Some(body) = outcome.body else { continue };

            let feed = match feed_rs::parser::parse(body.as_slice()) {
                Ok(feed) => feed,
                Err(e) => {
                    tracing::warn!(feed_url, error = %e, "funding feed failed to parse");
                    continue;
                }
            };

            for entry in feed.entries {
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let summary = entry.summary.map(|t| t.content).unwrap_or_default();
                let text = format!("{title} {summary}");
                if !FUNDING_KEYWORDS.is_match(&text) {
                    continue;
                }
                let Some(name) = extract_company_name(&title).or_else(|| extract_company_name(&summary)) else {
                    continue;
                };
                if !seen_names.insert(name.to_lowercase()) {
                    continue;
                }
                let funding_stage = FUNDING_STAGE
                    .captures(&text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string());
                let source_url = entry.links.first().map(|l| l.href.clone());

                let candidate = DiscoveredCompany {
                    name,
                    description: if summary.is_empty() { None } else { Some(summary) },
                    funding_stage,
                    source_url,
                    ..Default::default()
                };
                if tx.send((self.kind(), candidate)).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// `"Acme raises $12 million"` → `"Acme"`; returns `None` when the
/// text doesn't match one of the funding-announcement templates.
fn extract_company_name(text: &str) -> Option<String> {
    RAISES_TEMPLATE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_company_name_from_raises_template() {
        assert_eq!(
            extract_company_name("Acme Robotics raises $12 million in Series A"),
            Some("Acme Robotics".to_string())
        );
    }

    #[test]
    fn returns_none_for_unrelated_headline() {
        assert_eq!(extract_company_name("Acme ships new feature"), None);
    }

    #[test]
    fn funding_keyword_filter_matches_series_mentions() {
        assert!(FUNDING_KEYWORDS.is_match("Acme closes Series B round"));
        assert!(!FUNDING_KEYWORDS.is_match("Acme launches new product"));
    }
}
