use super::{jsonld, ExtractedJob, Extractor};
use crate::error::ExtractError;
use crate::html_utils::{self, ResponseBody};
use crate::models::AtsFamily;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct GreenhouseJobsResponse {
    jobs: Vec<GreenhouseJob>,
}

#[derive(Deserialize)]
struct GreenhouseJob {
    id: i64,
    title: String,
    absolute_url: String,
    location: Option<GreenhouseLocation>,
    departments: Option<Vec<GreenhouseDepartment>>,
    updated_at: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize)]
struct GreenhouseLocation {
    name: Option<String>,
}

#[derive(Deserialize)]
struct GreenhouseDepartment {
    name: Option<String>,
}

pub struct GreenhouseExtractor;

#[async_trait]
impl Extractor for GreenhouseExtractor {
    fn family(&self) -> AtsFamily {
        AtsFamily::Greenhouse
    }

    async fn extract(
        &self,
        bytes: &[u8],
        url: &str,
        _identifier: Option<&str>,
    ) -> Result<Vec<ExtractedJob>, ExtractError> {
        match html_utils::sniff_response_body(bytes) {
            ResponseBody::Json(_) => {
                let text = String::from_utf8_lossy(bytes);
                let parsed: GreenhouseJobsResponse = serde_json::from_str(&text)
                    .map_err(|e| ExtractError::Malformed(e.to_string()))?;
                Ok(parsed.jobs.into_iter().map(from_greenhouse_job).collect())
            }
            ResponseBody::Html(html) => {
                let jobs = jsonld::extract_job_postings_from_html(&html);
                if !jobs.is_empty() {
                    return Ok(jobs);
                }
                Ok(generic_job_link_enumeration(&html, url))
            }
        }
    }
}

fn from_greenhouse_job(job: GreenhouseJob) -> ExtractedJob {
    let mut extracted = ExtractedJob::new(job.title, job.absolute_url);
    extracted.location = job.location.and_then(|l| l.name);
    extracted.department = job
        .departments
        .and_then(|depts| depts.into_iter().next())
        .and_then(|d| d.name);
    extracted.posted_at = job.updated_at;
    extracted.description = job.content.map(|c| html_utils::html_to_markdown(&c));
    extracted.remote = extracted
        .location
        .as_ref()
        .map(|l| l.to_lowercase().contains("remote"));
    extracted
}

fn generic_job_link_enumeration(html: &str, base_url: &str) -> Vec<ExtractedJob> {
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };
    html_utils::extract_links(&base, html)
        .into_iter()
        .filter(|l| l.contains("/jobs/"))
        .map(|l| ExtractedJob::new("Untitled Position", l))
        .collect()
}

/// Parses a single-job response from the Greenhouse detail endpoint
/// (`/v1/boards/{slug}/jobs/{id}`), used by the Enrichment Engine.
pub fn parse_job_detail(bytes: &[u8]) -> Result<ExtractedJob, ExtractError> {
    let text = String::from_utf8_lossy(bytes);
    let job: GreenhouseJob =
        serde_json::from_str(&text).map_err(|e| ExtractError::Malformed(e.to_string()))?;
    let _ = job.id;
    Ok(from_greenhouse_job(job))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_jobs_from_list_api_response() {
        let body = serde_json::json!({
            "jobs": [
                {"id": 1, "title": "SWE", "absolute_url": "https://boards.greenhouse.io/acme/jobs/1",
                 "location": {"name": "Remote"}, "departments": [{"name": "Engineering"}],
                 "updated_at": "2024-01-01T00:00:00Z", "content": null},
                {"id": 2, "title": "PM", "absolute_url": "https://boards.greenhouse.io/acme/jobs/2",
                 "location": {"name": "New York, NY"}, "departments": null,
                 "updated_at": null, "content": null}
            ]
        });
        let extractor = GreenhouseExtractor;
        let jobs = extractor
            .extract(body.to_string().as_bytes(), "https://boards-api.greenhouse.io/v1/boards/acme/jobs", Some("acme"))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].title, "SWE");
        assert_eq!(jobs[0].location.as_deref(), Some("Remote"));
        assert_eq!(jobs[0].remote, Some(true));
        assert_eq!(jobs[1].remote, Some(false));
    }

    #[test]
    fn parses_single_job_detail() {
        let body = serde_json::json!({
            "id": 1, "title": "SWE", "absolute_url": "https://boards.greenhouse.io/acme/jobs/1",
            "location": {"name": "Remote"}, "departments": null,
            "updated_at": "2024-02-02T00:00:00Z", "content": "<p>Build things.</p>"
        });
        let job = parse_job_detail(body.to_string().as_bytes()).unwrap();
        assert_eq!(job.title, "SWE");
        assert_eq!(job.description.as_deref(), Some("Build things."));
        assert_eq!(job.posted_at.as_deref(), Some("2024-02-02T00:00:00Z"));
    }
}
