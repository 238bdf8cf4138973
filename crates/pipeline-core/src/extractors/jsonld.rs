//! Shared JSON-LD `JobPosting` walker, handles nested
//! `@graph`, `itemListElement`, and `mainEntity` wrappers, which sites
//! use interchangeably to embed one or many postings per page.

use super::{assemble_salary_from_jsonld, ExtractedJob};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref LD_JSON_BLOCK: Regex =
        Regex::new(r#"(?s)<script[^>]*type=["']application/ld\+json["'][^>]*>(.*?)</script>"#)
            .unwrap();
}

/// Extracts every JSON-LD `<script>` block from an HTML page and walks
/// each for `JobPosting` objects.
pub fn extract_job_postings_from_html(html: &str) -> Vec<ExtractedJob> {
    let mut jobs = Vec::new();
    for cap in LD_JSON_BLOCK.captures_iter(html) {
        let Some(raw) = cap.get(1) else { continue };
        if let Ok(value) = serde_json::from_str::<Value>(raw.as_str().trim()) {
            collect_job_postings(&value, &mut jobs);
        }
    }
    jobs
}

/// Recursively walks `@graph`, `itemListElement`, `mainEntity`, and
/// top-level arrays for nodes whose `@type` is `JobPosting`.
fn collect_job_postings(value: &Value, out: &mut Vec<ExtractedJob>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_job_postings(item, out);
            }
        }
        Value::Object(map) => {
            if is_job_posting(value) {
                if let Some(job) = parse_job_posting(map) {
                    out.push(job);
                }
            }
            if let Some(graph) = map.get("@graph") {
                collect_job_postings(graph, out);
            }
            if let Some(items) = map.get("itemListElement") {
                collect_job_postings(items, out);
            }
            if let Some(main_entity) = map.get("mainEntity") {
                collect_job_postings(main_entity, out);
            }
            // `itemListElement` entries are often wrapped one level
            // deeper under `item`.
            if let Some(item) = map.get("item") {
                collect_job_postings(item, out);
            }
        }
        _ => {}
    }
}

fn is_job_posting(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("JobPosting"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().map(|s| s.eq_ignore_ascii_case("JobPosting")).unwrap_or(false)),
        _ => false,
    }
}

fn parse_job_posting(map: &serde_json::Map<String, Value>) -> Option<ExtractedJob> {
    let title = map.get("title").and_then(|v| v.as_str())?.to_string();
    let url = map
        .get("url")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let mut job = ExtractedJob::new(title, url);
    job.description = map
        .get("description")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    job.posted_at = map
        .get("datePosted")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    job.employment_type = map
        .get("employmentType")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    job.department = map
        .get("hiringOrganization")
        .and_then(|o| o.get("department"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    job.location = map
        .get("jobLocation")
        .and_then(extract_location_name)
        .or_else(|| map.get("applicantLocationRequirements").and_then(extract_location_name));

    if let Some(base_salary) = map.get("baseSalary") {
        job.salary = assemble_salary_from_jsonld(base_salary);
    }

    job.remote = map
        .get("jobLocationType")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case("TELECOMMUTE"));

    Some(job)
}

fn extract_location_name(value: &Value) -> Option<String> {
    let node = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    node.get("address")
        .and_then(|a| a.get("addressLocality").or_else(|| a.get("name")))
        .and_then(|v| v.as_str())
        .or_else(|| node.get("name").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_job_posting_script() {
        let html = r#"
            <script type="application/ld+json">
            {"@type":"JobPosting","title":"SWE","url":"https://acme.com/jobs/1",
             "datePosted":"2024-01-01","jobLocation":{"address":{"addressLocality":"Remote"}}}
            </script>
        "#;
        let jobs = extract_job_postings_from_html(html);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "SWE");
        assert_eq!(jobs[0].location.as_deref(), Some("Remote"));
    }

    #[test]
    fn parses_nested_graph_and_item_list() {
        let html = r#"
            <script type="application/ld+json">
            {"@graph":[{"@type":"JobPosting","title":"PM","url":"https://acme.com/jobs/2"}]}
            </script>
        "#;
        let jobs = extract_job_postings_from_html(html);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "PM");
    }

    #[test]
    fn assembles_salary_range_from_base_salary() {
        let base_salary = serde_json::json!({
            "currency": "USD",
            "value": {"minValue": 100000, "maxValue": 150000}
        });
        assert_eq!(
            assemble_salary_from_jsonld(&base_salary).as_deref(),
            Some("USD 100000-150000")
        );
    }
}
