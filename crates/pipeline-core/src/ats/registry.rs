//! Static table of ATS families. Each entry names its own
//! URL/HTML/embed patterns and API templates; the Greenhouse, Lever,
//! Ashby, and Workable entries reproduce those vendors' real URL
//! shapes bit-exact.

use crate::models::AtsFamily;
use lazy_static::lazy_static;
use regex::Regex;

pub struct AtsRegistryEntry {
    pub family: AtsFamily,
    /// Ordered; the first match's capture group 1 is the identifier.
    pub url_patterns: Vec<Regex>,
    pub html_patterns: Vec<Regex>,
    pub embed_patterns: Vec<Regex>,
    pub api_list_template: Option<&'static str>,
    pub api_detail_template: Option<&'static str>,
    pub careers_url_template: &'static str,
    pub identifier_regex: Regex,
}

impl AtsRegistryEntry {
    pub fn careers_url_for(&self, identifier: &str) -> String {
        self.careers_url_template.replace("{id}", identifier)
    }

    pub fn api_list_url_for(&self, identifier: &str) -> Option<String> {
        self.api_list_template.map(|t| t.replace("{id}", identifier))
    }

    pub fn api_detail_url_for(&self, identifier: &str, job_id: &str) -> Option<String> {
        self.api_detail_template
            .map(|t| t.replace("{id}", identifier).replace("{job_id}", job_id))
    }

    pub fn identifier_is_valid(&self, identifier: &str) -> bool {
        self.identifier_regex.is_match(identifier) && !is_blocklisted(identifier)
    }
}

/// Identifiers that slipped through a regex but are obviously not a
/// real board token — template placeholders, CSS/JS asset fragments,
/// generic path segments. Applied to every family: the blocklist was
/// first observed as a Greenhouse-specific quirk but holds generally,
/// since no ATS issues board tokens that look like asset paths.
pub fn is_blocklisted(identifier: &str) -> bool {
    if identifier.len() > 100 || identifier.len() < 3 {
        return true;
    }
    const BLOCKED: &[&str] = &["embed", "job_board", "js", "css", "api", "jobs", "undefined"];
    let lower = identifier.to_lowercase();
    if BLOCKED.contains(&lower.as_str()) {
        return true;
    }
    if identifier.starts_with("${") || identifier.starts_with("{{") {
        return true;
    }
    if identifier.contains('<') || identifier.contains('>') || identifier.contains(';') {
        return true;
    }
    false
}

lazy_static! {
    pub static ref REGISTRY: Vec<AtsRegistryEntry> = build_registry();
}

pub fn registry() -> &'static [AtsRegistryEntry] {
    &REGISTRY
}

pub fn entry_for(family: AtsFamily) -> Option<&'static AtsRegistryEntry> {
    registry().iter().find(|e| e.family == family)
}

fn build_registry() -> Vec<AtsRegistryEntry> {
    vec![
        AtsRegistryEntry {
            family: AtsFamily::Greenhouse,
            url_patterns: vec![
                Regex::new(r"boards\.greenhouse\.io/([a-zA-Z0-9_-]+)").unwrap(),
                Regex::new(r"boards-api\.greenhouse\.io/v1/boards/([a-zA-Z0-9_-]+)").unwrap(),
                Regex::new(r"job-boards\.greenhouse\.io/([a-zA-Z0-9_-]+)").unwrap(),
            ],
            html_patterns: vec![
                // Capturing pattern first: a page can legitimately contain
                // the bare `greenhouse.io` substring (the vendor's own
                // embed snippet does) well before any `data-board-token`
                // attribute appears, so the identifier-bearing pattern
                // must be tried before the keyword-only one.
                Regex::new(r#"(?i)data-board-token=["']([a-zA-Z0-9_-]+)["']"#).unwrap(),
                Regex::new(r"(?i)greenhouse\.io").unwrap(),
            ],
            embed_patterns: vec![
                Regex::new(r"(?i)boards\.greenhouse\.io/embed/job_board\?for=([a-zA-Z0-9_-]+)")
                    .unwrap(),
                Regex::new(r"(?i)greenhouse\.io/embed/job_board/js\?for=([a-zA-Z0-9_-]+)").unwrap(),
            ],
            api_list_template: Some("https://boards-api.greenhouse.io/v1/boards/{id}/jobs"),
            api_detail_template: Some("https://boards-api.greenhouse.io/v1/boards/{id}/jobs/{job_id}"),
            careers_url_template: "https://boards.greenhouse.io/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{3,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Lever,
            url_patterns: vec![Regex::new(r"jobs\.lever\.co/([a-zA-Z0-9_-]+)").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)lever\.co").unwrap()],
            embed_patterns: vec![
                Regex::new(r"(?i)jobs\.lever\.co/([a-zA-Z0-9_-]+)/embed").unwrap(),
            ],
            api_list_template: Some("https://jobs.lever.co/{id}?mode=json"),
            api_detail_template: None,
            careers_url_template: "https://jobs.lever.co/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{3,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Ashby,
            url_patterns: vec![
                Regex::new(r"jobs\.ashbyhq\.com/([a-zA-Z0-9_-]+)").unwrap(),
                Regex::new(r"api\.ashbyhq\.com/posting-api/job-board/([a-zA-Z0-9_-]+)").unwrap(),
            ],
            html_patterns: vec![Regex::new(r"(?i)ashbyhq\.com").unwrap()],
            embed_patterns: vec![Regex::new(r"(?i)ashbyhq\.com/embed/([a-zA-Z0-9_-]+)").unwrap()],
            api_list_template: Some("https://api.ashbyhq.com/posting-api/job-board/{id}"),
            api_detail_template: Some(
                "https://api.ashbyhq.com/posting-api/job-board/{id}/posting/{job_id}",
            ),
            careers_url_template: "https://jobs.ashbyhq.com/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{3,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Workable,
            url_patterns: vec![
                Regex::new(r"apply\.workable\.com/([a-zA-Z0-9_-]+)").unwrap(),
                Regex::new(r"([a-zA-Z0-9_-]+)\.workable\.com").unwrap(),
            ],
            html_patterns: vec![Regex::new(r"(?i)workable\.com").unwrap()],
            embed_patterns: vec![
                Regex::new(r"(?i)apply\.workable\.com/j/([a-zA-Z0-9]+)").unwrap(),
            ],
            api_list_template: Some("https://apply.workable.com/api/v1/widget/accounts/{id}"),
            api_detail_template: Some(
                "https://apply.workable.com/api/v2/accounts/{id}/jobs/{job_id}",
            ),
            careers_url_template: "https://apply.workable.com/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{3,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::BambooHr,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.bamboohr\.com/careers").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)bamboohr\.com").unwrap()],
            embed_patterns: vec![Regex::new(r"(?i)bamboohr\.com/js/embed\.js").unwrap()],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.bamboohr.com/careers",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::SmartRecruiters,
            url_patterns: vec![
                Regex::new(r"careers\.smartrecruiters\.com/([a-zA-Z0-9_-]+)").unwrap(),
            ],
            html_patterns: vec![Regex::new(r"(?i)smartrecruiters\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://careers.smartrecruiters.com/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::JazzHr,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.applytojob\.com").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)applytojob\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.applytojob.com",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::BreezyHr,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.breezy\.hr").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)breezy\.hr").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.breezy.hr",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Recruitee,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.recruitee\.com").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)recruitee\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.recruitee.com",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Personio,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.jobs\.personio\.(de|com)").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)personio\.(de|com)").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.jobs.personio.com",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Teamtailor,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.teamtailor\.com").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)teamtailor\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.teamtailor.com",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Workday,
            url_patterns: vec![
                Regex::new(r"([a-zA-Z0-9_-]+)\.wd\d+\.myworkdayjobs\.com/([a-zA-Z0-9_-]+)")
                    .unwrap(),
            ],
            html_patterns: vec![Regex::new(r"(?i)myworkdayjobs\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.wd1.myworkdayjobs.com/careers",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Icims,
            url_patterns: vec![Regex::new(r"([a-zA-Z0-9_-]+)\.icims\.com").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)icims\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.icims.com",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::SuccessFactors,
            url_patterns: vec![
                Regex::new(r"([a-zA-Z0-9_-]+)\.(successfactors|careers)\.com").unwrap(),
            ],
            html_patterns: vec![Regex::new(r"(?i)successfactors\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://{id}.careers.successfactors.com",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Paylocity,
            url_patterns: vec![
                Regex::new(r"recruiting\.paylocity\.com/recruiting/jobs/All/([a-zA-Z0-9_-]+)")
                    .unwrap(),
            ],
            html_patterns: vec![Regex::new(r"(?i)paylocity\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://recruiting.paylocity.com/recruiting/jobs/All/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::AdpWorkforceNow,
            url_patterns: vec![Regex::new(r"workforcenow\.adp\.com/.*cid=([a-zA-Z0-9_-]+)").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)workforcenow\.adp\.com").unwrap()],
            embed_patterns: vec![],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://workforcenow.adp.com/mascsr/default/mdf/recruitment/recruitment.html?cid={id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
        AtsRegistryEntry {
            family: AtsFamily::Jobvite,
            url_patterns: vec![Regex::new(r"jobs\.jobvite\.com/([a-zA-Z0-9_-]+)").unwrap()],
            html_patterns: vec![Regex::new(r"(?i)jobvite\.com").unwrap()],
            embed_patterns: vec![Regex::new(r"(?i)jobvite\.com/.*company=([a-zA-Z0-9_-]+)").unwrap()],
            api_list_template: None,
            api_detail_template: None,
            careers_url_template: "https://jobs.jobvite.com/{id}",
            identifier_regex: Regex::new(r"^[a-zA-Z0-9_-]{2,100}$").unwrap(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greenhouse_url_pattern_captures_slug() {
        let entry = entry_for(AtsFamily::Greenhouse).unwrap();
        let url = "https://boards.greenhouse.io/acme";
        let captured = entry.url_patterns[0].captures(url).unwrap();
        assert_eq!(&captured[1], "acme");
    }

    #[test]
    fn blocklist_rejects_template_placeholders_and_generic_words() {
        assert!(is_blocklisted("embed"));
        assert!(is_blocklisted("${boardToken}"));
        assert!(is_blocklisted("js"));
        assert!(is_blocklisted(&"a".repeat(101)));
        assert!(!is_blocklisted("acme"));
    }

    #[test]
    fn api_templates_render_bit_exact_urls() {
        let gh = entry_for(AtsFamily::Greenhouse).unwrap();
        assert_eq!(
            gh.api_list_url_for("acme").unwrap(),
            "https://boards-api.greenhouse.io/v1/boards/acme/jobs"
        );
        assert_eq!(
            gh.api_detail_url_for("acme", "42").unwrap(),
            "https://boards-api.greenhouse.io/v1/boards/acme/jobs/42"
        );

        let lever = entry_for(AtsFamily::Lever).unwrap();
        assert_eq!(
            lever.api_list_url_for("acme").unwrap(),
            "https://jobs.lever.co/acme?mode=json"
        );

        let ashby = entry_for(AtsFamily::Ashby).unwrap();
        assert_eq!(
            ashby.api_list_url_for("acme").unwrap(),
            "https://api.ashbyhq.com/posting-api/job-board/acme"
        );
        assert_eq!(
            ashby.api_detail_url_for("acme", "uuid-1").unwrap(),
            "https://api.ashbyhq.com/posting-api/job-board/acme/posting/uuid-1"
        );

        let workable = entry_for(AtsFamily::Workable).unwrap();
        assert_eq!(
            workable.api_list_url_for("acme").unwrap(),
            "https://apply.workable.com/api/v1/widget/accounts/acme"
        );
        assert_eq!(
            workable.api_detail_url_for("acme", "ABC123").unwrap(),
            "https://apply.workable.com/api/v2/accounts/acme/jobs/ABC123"
        );
    }
}
