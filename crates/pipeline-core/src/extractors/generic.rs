//! The fallback extractor for every ATS family without a dedicated
//! implementation, and the last-resort path for
//! every family when its own extractor turns up nothing. Order: JSON-LD
//! → family-agnostic DOM selectors → `__NEXT_DATA__`-style embedded
//! JSON → generic job-link enumeration → LLM (only if attached).

use super::{jsonld, llm::LlmExtractor, ExtractedJob, Extractor};
use crate::error::ExtractError;
use crate::html_utils::{self, ResponseBody};
use crate::models::AtsFamily;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref NEXT_DATA: Regex =
        Regex::new(r#"(?s)<script[^>]*id=["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#).unwrap();
    static ref DESCRIPTION_SELECTORS: Vec<Regex> = vec![
        class_block_regex("job-description"),
        class_block_regex("posting-description"),
        class_block_regex("description"),
        Regex::new(r"(?s)<article[^>]*>(.*?)</article>").unwrap(),
    ];
}

fn class_block_regex(class_name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?s)<div[^>]*class=["'][^"']*{}[^"']*["'][^>]*>(.*?)</div>"#,
        regex::escape(class_name)
    ))
    .unwrap()
}

pub struct GenericExtractor {
    llm: Option<Arc<LlmExtractor>>,
}

impl GenericExtractor {
    pub fn new() -> Self {
        Self { llm: None }
    }

    pub fn with_llm(mut self, llm: Arc<LlmExtractor>) -> Self {
        self.llm = Some(llm);
        self
    }
}

impl Default for GenericExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for GenericExtractor {
    fn family(&self) -> AtsFamily {
        AtsFamily::Custom
    }

    async fn extract(
        &self,
        bytes: &[u8],
        url: &str,
        _identifier: Option<&str>,
    ) -> Result<Vec<ExtractedJob>, ExtractError> {
        let html = match html_utils::sniff_response_body(bytes) {
            ResponseBody::Json(value) => {
                // A bare JSON body with no known shape: surface nothing
                // rather than guessing; caller may still try LLM on the
                // rendered HTML if this was a JS-render result.
                debug!(url, "generic extractor received unrecognized JSON shape");
                let _ = value;
                return Ok(Vec::new());
            }
            ResponseBody::Html(html) => html,
        };

        let jsonld_jobs = jsonld::extract_job_postings_from_html(&html);
        if !jsonld_jobs.is_empty() {
            return Ok(jsonld_jobs);
        }

        if let Some(jobs) = extract_from_next_data(&html, url) {
            if !jobs.is_empty() {
                return Ok(jobs);
            }
        }

        let dom_jobs = extract_description_block(&html, url);
        if !dom_jobs.is_empty() {
            return Ok(dom_jobs);
        }

        let link_jobs = generic_job_link_enumeration(&html, url);
        if !link_jobs.is_empty() {
            return Ok(link_jobs);
        }

        if let Some(llm) = &self.llm {
            return llm.extract(&html, url).await;
        }

        Ok(Vec::new())
    }
}

/// `__NEXT_DATA__` embeds a pre-parsed JSON tree; treated as a regular
/// JSON extraction path rather than ad-hoc HTML scraping.
fn extract_from_next_data(html: &str, url: &str) -> Option<Vec<ExtractedJob>> {
    let cap = NEXT_DATA.captures(html)?;
    let raw = cap.get(1)?.as_str();
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let mut jobs = Vec::new();
    walk_for_postings(&value, url, &mut jobs);
    Some(jobs)
}

fn walk_for_postings(value: &serde_json::Value, url: &str, out: &mut Vec<ExtractedJob>) {
    match value {
        serde_json::Value::Object(map) => {
            if let (Some(title), path) = (
                map.get("title").and_then(|v| v.as_str()),
                map.get("url").or_else(|| map.get("path")).and_then(|v| v.as_str()),
            ) {
                if looks_like_job_title_key(map) {
                    let mut job = ExtractedJob::new(title, path.unwrap_or(url).to_string());
                    job.location = map.get("location").and_then(|v| v.as_str()).map(String::from);
                    job.department = map.get("department").and_then(|v| v.as_str()).map(String::from);
                    out.push(job);
                    return;
                }
            }
            for v in map.values() {
                walk_for_postings(v, url, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk_for_postings(item, url, out);
            }
        }
        _ => {}
    }
}

fn looks_like_job_title_key(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    map.contains_key("title")
        && (map.contains_key("location") || map.contains_key("department") || map.contains_key("url"))
}

fn extract_description_block(html: &str, url: &str) -> Vec<ExtractedJob> {
    for selector in DESCRIPTION_SELECTORS.iter() {
        if let Some(cap) = selector.captures(html) {
            let description = html_utils::html_to_markdown(cap.get(1).unwrap().as_str());
            if description.is_empty() {
                continue;
            }
            let title = html_utils::extract_title(html).unwrap_or_else(|| "Untitled Position".to_string());
            let mut job = ExtractedJob::new(title, url.to_string());
            job.description = Some(description);
            job.posted_at = extract_date_posted(html);
            return vec![job];
        }
    }
    Vec::new()
}

fn extract_date_posted(html: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)"datePosted"\s*:\s*"([^"]+)""#).ok()?;
    re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn generic_job_link_enumeration(html: &str, base_url: &str) -> Vec<ExtractedJob> {
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };
    html_utils::extract_links(&base, html)
        .into_iter()
        .filter(|l| {
            let lower = l.to_lowercase();
            ["job", "career", "position", "opening"].iter().any(|kw| lower.contains(kw))
        })
        .map(|l| ExtractedJob::new("Untitled Position", l))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_description_block_when_no_jsonld() {
        let html = r#"<html><title>Careers</title><body>
            <div class="job-description"><p>We build things.</p></div>
        </body></html>"#;
        let extractor = GenericExtractor::new();
        let jobs = extractor
            .extract(html.as_bytes(), "https://acme.com/careers/swe", None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].description.as_deref(), Some("We build things."));
    }

    #[tokio::test]
    async fn falls_back_to_link_enumeration_when_nothing_else_matches() {
        let html = r#"<a href="/careers/swe-engineer">Software Engineer</a><a href="/about">About</a>"#;
        let extractor = GenericExtractor::new();
        let jobs = extractor
            .extract(html.as_bytes(), "https://acme.com/careers", None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].source_url, "https://acme.com/careers/swe-engineer");
    }

    #[tokio::test]
    async fn empty_page_yields_no_jobs_without_llm_attached() {
        let html = "<html><body><p>Nothing here.</p></body></html>";
        let extractor = GenericExtractor::new();
        let jobs = extractor
            .extract(html.as_bytes(), "https://acme.com/careers", None)
            .await
            .unwrap();
        assert!(jobs.is_empty());
    }
}
