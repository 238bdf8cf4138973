use super::{jsonld, ExtractedJob, Extractor};
use crate::error::ExtractError;
use crate::html_utils::{self, ResponseBody};
use crate::models::AtsFamily;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct LeverPosting {
    text: String,
    #[serde(rename = "hostedUrl")]
    hosted_url: String,
    categories: Option<LeverCategories>,
    #[serde(rename = "createdAt")]
    created_at: Option<i64>,
}

#[derive(Deserialize)]
struct LeverCategories {
    location: Option<String>,
    department: Option<String>,
    commitment: Option<String>,
}

pub struct LeverExtractor;

#[async_trait]
impl Extractor for LeverExtractor {
    fn family(&self) -> AtsFamily {
        AtsFamily::Lever
    }

    async fn extract(
        &self,
        bytes: &[u8],
        _url: &str,
        _identifier: Option<&str>,
    ) -> Result<Vec<ExtractedJob>, ExtractError> {
        match html_utils::sniff_response_body(bytes) {
            ResponseBody::Json(_) => {
                let text = String::from_utf8_lossy(bytes);
                let postings: Vec<LeverPosting> =
                    serde_json::from_str(&text).map_err(|e| ExtractError::Malformed(e.to_string()))?;
                Ok(postings.into_iter().map(from_lever_posting).collect())
            }
            ResponseBody::Html(html) => {
                let jsonld_jobs = jsonld::extract_job_postings_from_html(&html);
                if !jsonld_jobs.is_empty() {
                    return Ok(jsonld_jobs);
                }
                Ok(extract_from_posting_description(&html))
            }
        }
    }
}

fn from_lever_posting(posting: LeverPosting) -> ExtractedJob {
    let mut job = ExtractedJob::new(posting.text, posting.hosted_url);
    if let Some(categories) = posting.categories {
        job.location = categories.location;
        job.department = categories.department;
        job.employment_type = categories.commitment;
        job.remote = job.location.as_ref().map(|l| l.to_lowercase().contains("remote"));
    }
    job.posted_at = posting.created_at.map(|ms| ms.to_string());
    job
}

/// HTML fallback for a single posting page: prefer JSON-LD `description`
/// (handled by caller before this), fall back to `.posting-description`.
fn extract_from_posting_description(html: &str) -> Vec<ExtractedJob> {
    let re = regex::Regex::new(r#"(?s)<div[^>]*class=["'][^"']*posting-description[^"']*["'][^>]*>(.*?)</div>"#)
        .unwrap();
    let Some(cap) = re.captures(html) else {
        return Vec::new();
    };
    let description = html_utils::html_to_markdown(cap.get(1).unwrap().as_str());
    let title = html_utils::extract_title(html).unwrap_or_else(|| "Untitled Position".to_string());
    let mut job = ExtractedJob::new(title, String::new());
    job.description = Some(description);
    vec![job]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_from_json_list() {
        let body = serde_json::json!([
            {"text": "SWE", "hostedUrl": "https://jobs.lever.co/acme/1",
             "categories": {"location": "Remote", "department": "Eng", "commitment": "Full-time"},
             "createdAt": 1700000000000_i64}
        ]);
        let extractor = LeverExtractor;
        let jobs = extractor
            .extract(body.to_string().as_bytes(), "https://jobs.lever.co/acme?mode=json", Some("acme"))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "SWE");
        assert_eq!(jobs[0].remote, Some(true));
    }
}
