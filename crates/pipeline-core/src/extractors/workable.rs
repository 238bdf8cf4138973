use super::{jsonld, ExtractedJob, Extractor};
use crate::error::ExtractError;
use crate::html_utils::{self, ResponseBody};
use crate::models::AtsFamily;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct WorkableWidgetResponse {
    jobs: Vec<WorkableJob>,
}

#[derive(Deserialize)]
struct WorkableJob {
    title: String,
    shortcode: Option<String>,
    url: Option<String>,
    location: Option<WorkableLocation>,
    department: Option<String>,
    employment_type: Option<String>,
    published_on: Option<String>,
    description: Option<String>,
    requirements: Option<String>,
}

#[derive(Deserialize)]
struct WorkableLocation {
    location_str: Option<String>,
    #[serde(default)]
    telecommuting: bool,
}

pub struct WorkableExtractor;

#[async_trait]
impl Extractor for WorkableExtractor {
    fn family(&self) -> AtsFamily {
        AtsFamily::Workable
    }

    async fn extract(
        &self,
        bytes: &[u8],
        url: &str,
        _identifier: Option<&str>,
    ) -> Result<Vec<ExtractedJob>, ExtractError> {
        match html_utils::sniff_response_body(bytes) {
            ResponseBody::Json(value) => {
                if value.get("jobs").is_some() {
                    let text = String::from_utf8_lossy(bytes);
                    let parsed: WorkableWidgetResponse =
                        serde_json::from_str(&text).map_err(|e| ExtractError::Malformed(e.to_string()))?;
                    Ok(parsed.jobs.into_iter().map(from_workable_job).collect())
                } else {
                    let job: WorkableJob = serde_json::from_value(value)
                        .map_err(|e| ExtractError::Malformed(e.to_string()))?;
                    Ok(vec![from_workable_job(job)])
                }
            }
            ResponseBody::Html(html) => Ok(jsonld::extract_job_postings_from_html(&html)
                .into_iter()
                .map(|mut job| {
                    if job.source_url.is_empty() {
                        job.source_url = url.to_string();
                    }
                    job
                })
                .collect()),
        }
    }
}

fn from_workable_job(job: WorkableJob) -> ExtractedJob {
    let url = job.url.unwrap_or_default();
    let mut extracted = ExtractedJob::new(job.title, url);
    extracted.employment_type = job.employment_type;
    extracted.posted_at = job.published_on;
    extracted.description = job.description.map(|d| html_utils::html_to_markdown(&d));
    extracted.department = job.department;
    if let Some(req) = job.requirements {
        extracted.requirements.push(html_utils::html_to_markdown(&req));
    }
    if let Some(location) = job.location {
        extracted.location = location.location_str;
        extracted.remote = Some(location.telecommuting);
    }
    let _ = job.shortcode;
    extracted
}

/// Extracts the short-code from a `/j/<code>` job-detail path, used by
/// the Enrichment Engine.
pub fn shortcode_from_url(url: &str) -> Option<String> {
    let re = regex::Regex::new(r"/j/([a-zA-Z0-9]+)").unwrap();
    re.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_from_widget_list_response() {
        let body = serde_json::json!({
            "jobs": [
                {"title": "SWE", "shortcode": "ABC123", "url": "https://apply.workable.com/acme/j/ABC123/",
                 "location": {"location_str": "Remote", "telecommuting": true},
                 "department": "Engineering", "employment_type": "Full-time",
                 "published_on": "2024-01-01", "description": "<p>Build.</p>", "requirements": null}
            ]
        });
        let extractor = WorkableExtractor;
        let jobs = extractor
            .extract(
                body.to_string().as_bytes(),
                "https://apply.workable.com/api/v1/widget/accounts/acme",
                Some("acme"),
            )
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].remote, Some(true));
        assert_eq!(jobs[0].description.as_deref(), Some("Build."));
    }

    #[test]
    fn shortcode_extracted_from_job_path() {
        assert_eq!(
            shortcode_from_url("https://apply.workable.com/acme/j/ABC123/").as_deref(),
            Some("ABC123")
        );
        assert!(shortcode_from_url("https://apply.workable.com/acme").is_none());
    }
}
