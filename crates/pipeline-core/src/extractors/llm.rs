//! LLM-assisted last-resort extractor step 4. Only reachable
//! from the generic extractor's fallback chain when no DOM/JSON-LD path
//! produced any jobs. Results are cached by content hash so a repeated
//! crawl of an unchanged page never re-spends a model call.

use super::ExtractedJob;
use crate::error::ExtractError;
use crate::html_utils;
use crate::models::ContentHash;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Truncation bound applied before sending page content to the model —
/// keeps prompts within a predictable token budget.
const MAX_CONTENT_CHARS: usize = 30_000;

#[derive(Debug, Deserialize, JsonSchema)]
struct LlmJobEntry {
    title: String,
    location: Option<String>,
    department: Option<String>,
    employment_type: Option<String>,
    url_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LlmJobsResponse {
    jobs: Vec<LlmJobEntry>,
}

pub struct LlmExtractor {
    client: openai_client::OpenAIClient,
    model: String,
    cache: Mutex<HashMap<String, Vec<ExtractedJob>>>,
}

const SYSTEM_PROMPT: &str = "You extract job postings from careers-page content. \
Return every distinct open position you can find, with its title and, when present, \
its location, department, employment type, and a relative URL path to the posting. \
Do not invent jobs that are not present in the content.";

impl LlmExtractor {
    pub fn new(client: openai_client::OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn extract(&self, html: &str, base_url: &str) -> Result<Vec<ExtractedJob>, ExtractError> {
        let hash = ContentHash::from_content(html).to_hex();
        if let Some(cached) = self.cache.lock().unwrap().get(&hash).cloned() {
            debug!(hash, "LLM extraction cache hit");
            return Ok(cached);
        }

        let mut content = html_utils::html_to_markdown(html);
        if content.chars().count() > MAX_CONTENT_CHARS {
            content = content.chars().take(MAX_CONTENT_CHARS).collect();
        }

        let response: LlmJobsResponse = self
            .client
            .extract(&self.model, SYSTEM_PROMPT, content)
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM extraction fallback failed");
                ExtractError::Llm(e.to_string())
            })?;

        let base = url::Url::parse(base_url).ok();
        let jobs: Vec<ExtractedJob> = response
            .jobs
            .into_iter()
            .map(|entry| to_extracted_job(entry, base.as_ref(), base_url))
            .collect();

        self.cache.lock().unwrap().insert(hash, jobs.clone());
        Ok(jobs)
    }
}

fn to_extracted_job(entry: LlmJobEntry, base: Option<&url::Url>, base_url: &str) -> ExtractedJob {
    let source_url = entry
        .url_path
        .as_deref()
        .and_then(|path| base.and_then(|b| b.join(path).ok()))
        .map(|u| u.to_string())
        .unwrap_or_else(|| base_url.to_string());

    let mut job = ExtractedJob::new(entry.title, source_url);
    job.location = entry.location;
    job.department = entry.department;
    job.employment_type = entry.employment_type;
    job
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_url_path_against_base() {
        let base = url::Url::parse("https://acme.com/careers").unwrap();
        let entry = LlmJobEntry {
            title: "SWE".into(),
            location: None,
            department: None,
            employment_type: None,
            url_path: Some("/careers/swe".into()),
        };
        let job = to_extracted_job(entry, Some(&base), "https://acme.com/careers");
        assert_eq!(job.source_url, "https://acme.com/careers/swe");
    }

    #[test]
    fn falls_back_to_base_url_without_path() {
        let entry = LlmJobEntry {
            title: "SWE".into(),
            location: None,
            department: None,
            employment_type: None,
            url_path: None,
        };
        let job = to_extracted_job(entry, None, "https://acme.com/careers");
        assert_eq!(job.source_url, "https://acme.com/careers");
    }
}
