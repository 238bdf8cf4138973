//! YC / accelerator directories source. Parses the
//! directory page's embedded JSON (`__NEXT_DATA__` or similar) and
//! falls back to HTML anchor enumeration when no embedded JSON is
//! present.

use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::models::{DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;

lazy_static! {
    static ref NEXT_DATA: Regex =
        Regex::new(r#"(?s)<script[^>]*id=["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#).unwrap();
    static ref ANCHOR: Regex =
        Regex::new(r#"(?s)<a[^>]*href=["'](https?://[^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
}

pub struct AcceleratorSource {
    directory_urls: Vec<String>,
}

impl AcceleratorSource {
    pub fn new(directory_urls: Vec<String>) -> Self {
        Self { directory_urls }
    }
}

#[async_trait]
impl DiscoverySource for AcceleratorSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::Accelerator
    }

    fn name(&self) -> &str {
        "accelerator"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        progress.set_total(self.directory_urls.len() as i64);
        for url in &self.directory_urls {
            progress.increment();
            let outcome = ctx.fetcher.fetch(url).await?;
            let Some(body) = outcome.body else { continue };
            let html = String::from_utf8_lossy(&body);

            let candidates = extract_from_next_data(&html)
                .unwrap_or_else(|| extract_from_anchors(&html, url));

            for candidate in candidates {
                let Some(domain) = &candidate.domain else { continue };
                if ctx.dedup.is_duplicate_domain(domain).await {
                    continue;
                }
                if tx.send((self.kind(), candidate)).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Walks the `__NEXT_DATA__` JSON tree for objects carrying both a
/// `name` and a `website`/`url` string field.
fn extract_from_next_data(html: &str) -> Option<Vec<DiscoveredCompany>> {
    let raw = NEXT_DATA.captures(html)?.get(1)?.as_str();
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let mut found = Vec::new();
    walk_json(&value, &mut found);
    Some(found)
}

fn walk_json(value: &Value, out: &mut Vec<DiscoveredCompany>) {
    match value {
        Value::Object(map) => {
            let name = map.get("name").and_then(|v| v.as_str());
            let website = map
                .get("website")
                .or_else(|| map.get("url"))
                .or_else(|| map.get("homepage_url"))
                .and_then(|v| v.as_str());
            if let (Some(name), Some(website)) = (name, website) {
                if let Some(domain) = html_utils::domain_from_url(website) {
                    out.push(DiscoveredCompany {
                        name: name.to_string(),
                        domain: Some(domain),
                        website_url: Some(website.to_string()),
                        source_url: Some(website.to_string()),
                        ..Default::default()
                    });
                }
            }
            for v in map.values() {
                walk_json(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_json(item, out);
            }
        }
        _ => {}
    }
}

/// Fallback when no `__NEXT_DATA__` blob is present: every external
/// anchor is treated as a candidate, with the link text as the name.
fn extract_from_anchors(html: &str, directory_url: &str) -> Vec<DiscoveredCompany> {
    let directory_domain = html_utils::domain_from_url(directory_url);
    let mut out = Vec::new();
    for cap in ANCHOR.captures_iter(html) {
        let Some(href) = cap.get(1) else { continue };
        let Some(text) = cap.get(2) else { continue };
        let href = href.as_str();
        let Some(domain) = html_utils::domain_from_url(href) else { continue };
        if Some(&domain) == directory_domain.as_ref() {
            continue;
        }
        let name = html_utils::decode_entities(text.as_str().trim());
        if name.is_empty() {
            continue;
        }
        out.push(DiscoveredCompany {
            name,
            domain: Some(domain),
            website_url: Some(href.to_string()),
            source_url: Some(directory_url.to_string()),
            ..Default::default()
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_next_data_company_entries() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">
            {"props":{"companies":[{"name":"Acme","website":"https://acme.com"}]}}
        </script>"#;
        let companies = extract_from_next_data(html).unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Acme");
        assert_eq!(companies[0].domain.as_deref(), Some("acme.com"));
    }

    #[test]
    fn falls_back_to_anchor_enumeration() {
        let html = r#"<a href="https://acme.com">Acme Inc</a><a href="https://directory.example/about">About</a>"#;
        let companies = extract_from_anchors(html, "https://directory.example/batch");
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Acme Inc");
    }
}
