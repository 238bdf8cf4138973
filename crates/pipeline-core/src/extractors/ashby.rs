use super::{jsonld, ExtractedJob, Extractor};
use crate::error::ExtractError;
use crate::html_utils::{self, ResponseBody};
use crate::models::AtsFamily;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct AshbyBoardResponse {
    jobs: Vec<AshbyJob>,
}

#[derive(Deserialize)]
struct AshbyJob {
    id: String,
    title: String,
    #[serde(rename = "jobUrl")]
    job_url: Option<String>,
    location: Option<String>,
    department: Option<String>,
    #[serde(rename = "employmentType")]
    employment_type: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(rename = "isRemote")]
    is_remote: Option<bool>,
    #[serde(rename = "descriptionHtml")]
    description_html: Option<String>,
}

pub struct AshbyExtractor;

#[async_trait]
impl Extractor for AshbyExtractor {
    fn family(&self) -> AtsFamily {
        AtsFamily::Ashby
    }

    async fn extract(
        &self,
        bytes: &[u8],
        url: &str,
        _identifier: Option<&str>,
    ) -> Result<Vec<ExtractedJob>, ExtractError> {
        match html_utils::sniff_response_body(bytes) {
            ResponseBody::Json(value) => {
                // Single-job detail responses are a bare job object;
                // list responses wrap jobs under `jobs`.
                if value.get("jobs").is_some() {
                    let text = String::from_utf8_lossy(bytes);
                    let parsed: AshbyBoardResponse =
                        serde_json::from_str(&text).map_err(|e| ExtractError::Malformed(e.to_string()))?;
                    Ok(parsed.jobs.into_iter().map(from_ashby_job).collect())
                } else {
                    let job: AshbyJob = serde_json::from_value(value)
                        .map_err(|e| ExtractError::Malformed(e.to_string()))?;
                    Ok(vec![from_ashby_job(job)])
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

fn from_ashby_job(job: AshbyJob) -> ExtractedJob {
    let url = job.job_url.unwrap_or_default();
    let mut extracted = ExtractedJob::new(job.title, url);
    extracted.location = job.location;
    extracted.department = job.department;
    extracted.employment_type = job.employment_type;
    extracted.posted_at = job.published_at;
    extracted.remote = job.is_remote;
    extracted.description = job.description_html.map(|h| html_utils::html_to_markdown(&h));
    let _ = job.id;
    extracted
}

/// Given a 404 from the single-job endpoint, fall back to searching the
/// listing endpoint's response for the matching id.
pub fn find_in_listing(bytes: &[u8], job_id: &str) -> Option<ExtractedJob> {
    let text = String::from_utf8_lossy(bytes);
    let parsed: AshbyBoardResponse = serde_json::from_str(&text).ok()?;
    parsed
        .jobs
        .into_iter()
        .find(|j| j.id == job_id)
        .map(from_ashby_job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_from_board_list_response() {
        let body = serde_json::json!({
            "jobs": [
                {"id": "uuid-1", "title": "SWE", "jobUrl": "https://jobs.ashbyhq.com/acme/uuid-1",
                 "location": "Remote", "department": "Engineering", "employmentType": "FullTime",
                 "publishedAt": "2024-01-01", "isRemote": true, "descriptionHtml": null}
            ]
        });
        let extractor = AshbyExtractor;
        let jobs = extractor
            .extract(body.to_string().as_bytes(), "https://api.ashbyhq.com/posting-api/job-board/acme", Some("acme"))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "SWE");
        assert_eq!(jobs[0].remote, Some(true));
    }

    #[test]
    fn finds_job_in_listing_by_id_on_404_fallback() {
        let body = serde_json::json!({
            "jobs": [{"id": "uuid-1", "title": "SWE", "jobUrl": null, "location": null,
                      "department": null, "employmentType": null, "publishedAt": null,
                      "isRemote": null, "descriptionHtml": null}]
        });
        let job = find_in_listing(body.to_string().as_bytes(), "uuid-1").unwrap();
        assert_eq!(job.title, "SWE");
        assert!(find_in_listing(body.to_string().as_bytes(), "missing").is_none());
    }
}
