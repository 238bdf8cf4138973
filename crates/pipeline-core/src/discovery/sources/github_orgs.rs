//! GitHub orgs source. Queries the public search API with location-
//! restricted queries, filtering organizations with a blog URL whose
//! location matches a U.S. location list, skipping `.edu`, non-
//! profits, and sports teams.
//!
//! Reports under `DiscoverySourceKind::Accelerator`: the
//! `DiscoverySourceKind` variants cover fewer kinds than named
//! producers, and this is the one folded in — both this and the
//! YC/accelerator directory source are structured company-directory
//! scans rather than ATS-embed or feed scraping, so they share a kind
//! (see DESIGN.md).

use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::models::{DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

const EXCLUDED_NAME_FRAGMENTS: &[&str] = &[
    "university", "college", "foundation", "nonprofit", "athletics", "sports", "academy",
];

pub struct GithubOrgsSource {
    queries: Vec<String>,
    us_locations: Vec<String>,
}

impl GithubOrgsSource {
    /// `queries` are GitHub search-API `q=` fragments, e.g.
    /// `"type:org location:\"San Francisco\""`. Unauthenticated
    /// GitHub search (no token support in the shared `HttpFetcher`,
    /// which does not carry per-call headers) is rate-limited to 10
    /// requests/minute — acceptable for a low-frequency source.
    pub fn new(queries: Vec<String>, us_locations: Vec<String>) -> Self {
        Self { queries, us_locations }
    }

    fn looks_excluded(&self, login: &str) -> bool {
        let lower = login.to_lowercase();
        if lower.ends_with(".edu") {
            return true;
        }
        EXCLUDED_NAME_FRAGMENTS.iter().any(|frag| lower.contains(frag))
    }

    fn location_matches_us(&self, location: &str) -> bool {
        let lower = location.to_lowercase();
        self.us_locations.iter().any(|candidate| lower.contains(&candidate.to_lowercase()))
            || lower.contains("usa")
            || lower.contains("united states")
    }
}

#[async_trait]
impl DiscoverySource for GithubOrgsSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::Accelerator
    }

    fn name(&self) -> &str {
        "github_orgs"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        progress.set_total(self.queries.len() as i64);
        for query in &self.queries {
            progress.increment();
            let url = format!(
                "https://api.github.com/search/users?q={}&per_page=50",
                urlencoding_light(query)
            );
            let outcome = ctx.fetcher.fetch(&url).await?;
            let Some(body) = outcome.body else { continue };
            let Ok(value) = serde_json::from_slice::<Value>(&body) else { continue };
            let Some(items) = value.get("items").and_then(|v| v.as_array()) else { continue };

            for item in items {
                let Some(login) = item.get("login").and_then(|v| v.as_str()) else { continue };
                if self.looks_excluded(login) {
                    continue;
                }
                let Some(org_url) = item.get("url").and_then(|v| v.as_str()) else { continue };
                let org_outcome = ctx.fetcher.fetch(org_url).await?;
                let Some(org_body) = org_outcome.body else { continue };
                let Ok(org) = serde_json::from_slice::<Value>(&org_body) else { continue };

                let blog = org.get("blog").and_then(|v| v.as_str()).filter(|s| !s.is_empty());
                let location = org.get("location").and_then(|v| v.as_str()).unwrap_or("");
                if blog.is_none() || !self.location_matches_us(location) {
                    continue;
                }
                let blog = blog.unwrap();
                let Some(domain) = html_utils::domain_from_url(blog).or_else(|| {
                    html_utils::domain_from_url(&format!("https://{blog}"))
                }) else {
                    continue;
                };
                if ctx.dedup.is_duplicate_domain(&domain).await {
                    continue;
                }
                let name = org
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(login)
                    .to_string();
                let candidate = DiscoveredCompany {
                    name,
                    domain: Some(domain),
                    website_url: Some(blog.to_string()),
                    location: Some(location.to_string()),
                    country: Some("US".to_string()),
                    source_url: Some(org_url.to_string()),
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

/// Minimal query-string escaping sufficient for GitHub search syntax
/// (spaces and quotes), avoiding a new `url`-encoding dependency.
fn urlencoding_light(s: &str) -> String {
    s.replace(' ', "+").replace('"', "%22")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_edu_and_nonprofit_style_logins() {
        let source = GithubOrgsSource::new(vec![], vec!["San Francisco".to_string()]);
        assert!(source.looks_excluded("stanford.edu"));
        assert!(source.looks_excluded("acme-foundation"));
        assert!(!source.looks_excluded("acme-labs"));
    }

    #[test]
    fn location_match_is_case_insensitive() {
        let source = GithubOrgsSource::new(vec![], vec!["Austin, TX".to_string()]);
        assert!(source.location_matches_us("austin, tx"));
        assert!(!source.location_matches_us("Berlin, Germany"));
    }
}
