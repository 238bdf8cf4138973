//! Raw → canonical field mapping. Pure functions over
//! strings; no I/O, no `Storage` dependency, so the Crawl/Enrichment/
//! Maintenance Engines can all call through the same table.

use crate::models::{EmploymentType, Job, JobRaw, LocationType, RoleFamily, Seniority};
use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// A replaceable role-classification table: `RoleTaxonomy::default()`
/// seeds the built-in regex set below, but callers needing a
/// different taxonomy (a different vertical, a different language)
/// can build their own via `RoleTaxonomy::new` instead of editing this
/// module.
pub struct RoleTaxonomy {
    table: Vec<(Regex, RoleFamily, &'static str)>,
}

impl RoleTaxonomy {
    pub fn new(table: Vec<(Regex, RoleFamily, &'static str)>) -> Self {
        Self { table }
    }

    pub fn classify(&self, title: &str) -> (RoleFamily, Option<String>) {
        for (re, family, specialization) in &self.table {
            if re.is_match(title) {
                return (*family, Some(specialization.to_string()));
            }
        }
        (RoleFamily::Other, None)
    }
}

impl Default for RoleTaxonomy {
    fn default() -> Self {
        Self::new(vec![
            (Regex::new(r"(?i)\b(software|backend|frontend|full.?stack|firmware|embedded|mobile|ios|android|platform|infrastructure|devops|sre|site reliability|qa|quality assurance|test engineer|security engineer)\b").unwrap(), RoleFamily::Engineering, "software"),
            (Regex::new(r"(?i)\b(data scientist|machine learning|ml engineer|applied scientist|research scientist|ai engineer)\b").unwrap(), RoleFamily::DataScience, "ml"),
            (Regex::new(r"(?i)\b(data engineer|analytics engineer|data analyst|business intelligence)\b").unwrap(), RoleFamily::DataScience, "data"),
            (Regex::new(r"(?i)\b(product designer|ux designer|ui designer|visual designer|graphic designer|design lead)\b").unwrap(), RoleFamily::Design, "product_design"),
            (Regex::new(r"(?i)\b(product manager|product owner|group product manager|product lead)\b").unwrap(), RoleFamily::Product, "product_management"),
            (Regex::new(r"(?i)\b(account executive|sales development|sdr|bdr|sales engineer|solutions engineer|account manager)\b").unwrap(), RoleFamily::Sales, "sales"),
            (Regex::new(r"(?i)\b(marketing manager|growth marketer|content marketer|demand generation|seo specialist|brand marketing)\b").unwrap(), RoleFamily::Marketing, "marketing"),
            (Regex::new(r"(?i)\b(operations manager|business operations|program manager|project manager|supply chain)\b").unwrap(), RoleFamily::Operations, "operations"),
            (Regex::new(r"(?i)\b(accountant|financial analyst|controller|finance manager|fp&a)\b").unwrap(), RoleFamily::Finance, "finance"),
            (Regex::new(r"(?i)\b(recruiter|people operations|hr business partner|talent acquisition|people partner)\b").unwrap(), RoleFamily::People, "people"),
            (Regex::new(r"(?i)\b(counsel|paralegal|compliance officer|legal ops)\b").unwrap(), RoleFamily::Legal, "legal"),
            (Regex::new(r"(?i)\b(customer support|support specialist|customer success|technical support)\b").unwrap(), RoleFamily::CustomerSupport, "support"),
        ])
    }
}

lazy_static! {
    static ref DEFAULT_ROLE_TAXONOMY: RoleTaxonomy = RoleTaxonomy::default();

    static ref SENIORITY_TABLE: Vec<(Regex, Seniority)> = vec![
        (Regex::new(r"(?i)\bintern(ship)?\b").unwrap(), Seniority::Intern),
        (Regex::new(r"(?i)\b(principal|distinguished)\b").unwrap(), Seniority::Principal),
        (Regex::new(r"(?i)\b(staff)\b").unwrap(), Seniority::Staff),
        (Regex::new(r"(?i)\b(director|vp|vice president|head of)\b").unwrap(), Seniority::Director),
        (Regex::new(r"(?i)\b(chief|ceo|cto|cfo|coo|president)\b").unwrap(), Seniority::Executive),
        (Regex::new(r"(?i)\b(engineering manager|manager,|manager of|team lead)\b").unwrap(), Seniority::Manager),
        (Regex::new(r"(?i)\blead\b").unwrap(), Seniority::Lead),
        (Regex::new(r"(?i)\b(senior|sr\.?)\b").unwrap(), Seniority::Senior),
        (Regex::new(r"(?i)\b(junior|jr\.?|entry.?level|associate)\b").unwrap(), Seniority::Junior),
        (Regex::new(r"(?i)\bmid.?level\b").unwrap(), Seniority::Mid),
    ];

    static ref REMOTE_RE: Regex = Regex::new(r"(?i)\b(remote|work from home|wfh|fully distributed|anywhere)\b").unwrap();
    static ref HYBRID_RE: Regex = Regex::new(r"(?i)\b(hybrid|flexible location)\b").unwrap();
    static ref ONSITE_RE: Regex = Regex::new(r"(?i)\b(on.?site|in.?office|in.?person)\b").unwrap();

    static ref TECH_HUB_CITIES: Vec<&'static str> = vec![
        "san francisco", "new york", "new york city", "seattle", "austin", "boston",
        "denver", "chicago", "los angeles", "san diego", "atlanta", "miami",
        "washington dc", "washington, dc", "portland", "minneapolis", "toronto",
        "vancouver", "london", "berlin", "dublin", "amsterdam", "singapore",
        "bangalore", "bengaluru", "tel aviv",
    ];

    static ref STATE_ABBREVIATIONS: Vec<&'static str> = vec![
        "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL",
        "IN", "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT",
        "NE", "NV", "NH", "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI",
        "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV", "WI", "WY",
    ];

    static ref STATE_SUFFIX_RE: Regex = Regex::new(r"(?i),\s*([A-Za-z]{2})\b").unwrap();
    static ref CITY_STATE_RE: Regex = Regex::new(r"(?i)\b([A-Za-z][A-Za-z .]{2,30}),\s*([A-Za-z]{2})\b").unwrap();

    static ref EMPLOYMENT_TABLE: Vec<(Regex, EmploymentType)> = vec![
        (Regex::new(r"(?i)\bintern(ship)?\b").unwrap(), EmploymentType::Internship),
        (Regex::new(r"(?i)\bpart.?time\b").unwrap(), EmploymentType::PartTime),
        (Regex::new(r"(?i)\b(contract|contractor|freelance)\b").unwrap(), EmploymentType::Contract),
        (Regex::new(r"(?i)\btemporary\b").unwrap(), EmploymentType::Temporary),
        (Regex::new(r"(?i)\bfull.?time\b").unwrap(), EmploymentType::FullTime),
    ];

    static ref SKILLS_DICTIONARY: Vec<&'static str> = vec![
        "rust", "python", "javascript", "typescript", "java", "go", "golang", "c++",
        "c#", "ruby", "kotlin", "swift", "scala", "php", "react", "vue", "angular",
        "node.js", "nodejs", "django", "flask", "rails", "spring", "kubernetes",
        "docker", "aws", "gcp", "azure", "terraform", "postgresql", "mysql",
        "mongodb", "redis", "kafka", "graphql", "sql", "machine learning",
        "tensorflow", "pytorch", "figma", "sketch", "salesforce", "hubspot",
        "excel", "tableau", "looker", "snowflake", "airflow", "spark",
    ];

    static ref SALARY_NUMBER_RE: Regex = Regex::new(r"(?i)(\d[\d,]*\.?\d*)\s*(k)?").unwrap();
}

/// `role_family`/`role_specialization` from `title` (fallback: `Other`/`None`),
/// via the default `RoleTaxonomy`. Callers that need a different
/// taxonomy should build their own `RoleTaxonomy` and call `classify`
/// directly instead.
pub fn classify_role(title: &str) -> (RoleFamily, Option<String>) {
    DEFAULT_ROLE_TAXONOMY.classify(title)
}

/// First matching entry in precedence order; `None` if nothing matches.
pub fn classify_seniority(title: &str) -> Option<Seniority> {
    for (re, seniority) in SENIORITY_TABLE.iter() {
        if re.is_match(title) {
            return Some(*seniority);
        }
    }
    None
}

/// `location_type` + canonical location names from a free-text location
/// string. Explicit remote + explicit hybrid in the same string resolves
/// to hybrid.
pub fn classify_location(raw: &str) -> (Option<LocationType>, Vec<String>) {
    let is_remote = REMOTE_RE.is_match(raw);
    let is_hybrid = HYBRID_RE.is_match(raw);
    let is_onsite = ONSITE_RE.is_match(raw);

    let location_type = if is_remote && is_hybrid {
        Some(LocationType::Hybrid)
    } else if is_hybrid {
        Some(LocationType::Hybrid)
    } else if is_remote {
        Some(LocationType::Remote)
    } else if is_onsite {
        Some(LocationType::Onsite)
    } else {
        None
    };

    (location_type, canonical_locations(raw))
}

fn canonical_locations(raw: &str) -> Vec<String> {
    let lower = raw.to_lowercase();
    let mut found = Vec::new();

    for city in TECH_HUB_CITIES.iter() {
        if lower.contains(city) {
            found.push(title_case(city));
        }
    }

    for cap in CITY_STATE_RE.captures_iter(raw) {
        let city = cap.get(1).unwrap().as_str().trim();
        let state = cap.get(2).unwrap().as_str().to_uppercase();
        if STATE_ABBREVIATIONS.iter().any(|s| *s == state) {
            let canonical = format!("{}, {}", title_case(city), state);
            if !found.iter().any(|f| f.eq_ignore_ascii_case(&canonical)) {
                found.push(canonical);
            }
        }
    }

    if found.is_empty() {
        if let Some(cap) = STATE_SUFFIX_RE.captures(raw) {
            let state = cap.get(1).unwrap().as_str().to_uppercase();
            if STATE_ABBREVIATIONS.iter().any(|s| *s == state) {
                found.push(state);
            }
        }
    }

    if found.is_empty() && !raw.trim().is_empty() {
        found.push(raw.trim().to_string());
    }

    found
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dictionary match over `title + body` (case-insensitive substring).
pub fn extract_skills(title: &str, body: &str) -> Vec<String> {
    let haystack = format!("{} {}", title, body).to_lowercase();
    SKILLS_DICTIONARY
        .iter()
        .filter(|skill| haystack.contains(*skill))
        .map(|s| s.to_string())
        .collect()
}

pub fn classify_employment_type(title: &str, raw: Option<&str>) -> Option<EmploymentType> {
    let haystack = format!("{} {}", title, raw.unwrap_or_default());
    for (re, kind) in EMPLOYMENT_TABLE.iter() {
        if re.is_match(&haystack) {
            return Some(*kind);
        }
    }
    None
}

/// Strip currency symbols/commas, expand `k`/`K` to thousands, take the
/// first two numbers found as (min, max).
pub fn parse_salary(raw: &str) -> (Option<i64>, Option<i64>) {
    let cleaned = raw.replace(['$', ',', '€', '£'], "");
    let mut numbers = Vec::new();
    for cap in SALARY_NUMBER_RE.captures_iter(&cleaned) {
        let Some(num_match) = cap.get(1) else { continue };
        let Ok(mut value) = num_match.as_str().parse::<f64>() else {
            continue;
        };
        if cap.get(2).is_some() {
            value *= 1000.0;
        }
        if value > 0.0 {
            numbers.push(value as i64);
        }
        if numbers.len() == 2 {
            break;
        }
    }
    match numbers.as_slice() {
        [min, max] => (Some(*min), Some(*max)),
        [single] => (Some(*single), Some(*single)),
        _ => (None, None),
    }
}

/// Flexible date parsing: RFC3339, then a handful of common ATS date
/// shapes (`YYYY-MM-DD`, `MM/DD/YYYY`, `Month D, YYYY`).
pub fn parse_posted_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single();
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single();
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%B %d, %Y") {
        return Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single();
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%a, %d %b %Y %H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// `0.5 ^ (days_old / half_life)`, clamped into `[0, 1]`.
pub fn freshness_score(posted_at: Option<DateTime<Utc>>, half_life_days: f64) -> Option<f32> {
    let posted_at = posted_at?;
    let days_old = (Utc::now() - posted_at).num_seconds() as f64 / 86_400.0;
    let days_old = days_old.max(0.0);
    let score = 0.5_f64.powf(days_old / half_life_days);
    Some(score.clamp(0.0, 1.0) as f32)
}

/// Turns a `JobRaw` into a fully normalized `Job`, reusing an existing
/// `Job` row's identity/timestamps when one is supplied (re-extraction).
pub fn normalize(
    raw: &JobRaw,
    existing: Option<&Job>,
    half_life_days: f64,
) -> Job {
    let (role_family, role_specialization) = classify_role(&raw.title_raw);
    let seniority = classify_seniority(&raw.title_raw);
    let body = raw.description_raw.as_deref().unwrap_or_default();
    let (location_type, locations) = classify_location(raw.location_raw.as_deref().unwrap_or_default());
    let skills = extract_skills(&raw.title_raw, body);
    let employment_type = classify_employment_type(&raw.title_raw, raw.employment_type_raw.as_deref());
    let (min_salary, max_salary) = raw
        .salary_raw
        .as_deref()
        .map(parse_salary)
        .unwrap_or((None, None));
    let posted_at = raw.posted_at_raw.as_deref().and_then(parse_posted_at);
    let freshness_score = freshness_score(posted_at, half_life_days);
    let now = Utc::now();

    match existing {
        Some(existing) => Job {
            id: existing.id,
            raw_job_id: Some(raw.id),
            title: raw.title_raw.clone(),
            description: raw.description_raw.clone().or_else(|| existing.description.clone()),
            role_family,
            role_specialization,
            seniority,
            location_type,
            locations,
            skills,
            min_salary,
            max_salary,
            employment_type,
            posted_at: posted_at.or(existing.posted_at),
            freshness_score,
            is_active: true,
            delisted_at: None,
            delist_reason: None,
            updated_at: now,
            ..existing.clone()
        },
        None => Job {
            id: crate::models::JobId::new(),
            company_id: raw.company_id,
            raw_job_id: Some(raw.id),
            title: raw.title_raw.clone(),
            description: raw.description_raw.clone(),
            source_url: raw.source_url.clone(),
            role_family,
            role_specialization,
            seniority,
            location_type,
            locations,
            skills,
            min_salary,
            max_salary,
            employment_type,
            posted_at,
            freshness_score,
            embedding: None,
            is_active: true,
            last_verified_at: None,
            delisted_at: None,
            delist_reason: None,
            enrich_failed_at: None,
            created_at: now,
            updated_at: now,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_engineering_roles() {
        let (family, spec) = classify_role("Senior Backend Engineer");
        assert_eq!(family, RoleFamily::Engineering);
        assert_eq!(spec.as_deref(), Some("software"));
    }

    #[test]
    fn falls_back_to_other_role_family() {
        let (family, spec) = classify_role("Chief Vibes Officer");
        assert_eq!(family, RoleFamily::Other);
        assert_eq!(spec, None);
    }

    #[test]
    fn seniority_precedence_prefers_principal_over_senior() {
        assert_eq!(
            classify_seniority("Principal Senior Staff Engineer"),
            Some(Seniority::Principal)
        );
    }

    #[test]
    fn remote_and_hybrid_together_resolves_to_hybrid() {
        let (location_type, _) = classify_location("Remote (hybrid 2 days/week in office)");
        assert_eq!(location_type, Some(LocationType::Hybrid));
    }

    #[test]
    fn extracts_city_state_pairs() {
        let (_, locations) = classify_location("Austin, TX or Denver, CO");
        assert!(locations.iter().any(|l| l == "Austin, TX"));
        assert!(locations.iter().any(|l| l == "Denver, CO"));
    }

    #[test]
    fn salary_parses_k_suffix_range() {
        assert_eq!(parse_salary("$120k - $150k"), (Some(120_000), Some(150_000)));
    }

    #[test]
    fn salary_parses_single_number() {
        assert_eq!(parse_salary("Salary: $95,000"), (Some(95_000), Some(95_000)));
    }

    #[test]
    fn skills_matches_dictionary_terms() {
        let skills = extract_skills("Rust Engineer", "Experience with Kubernetes and AWS required.");
        assert!(skills.contains(&"rust".to_string()));
        assert!(skills.contains(&"kubernetes".to_string()));
        assert!(skills.contains(&"aws".to_string()));
    }

    #[test]
    fn freshness_score_decays_by_half_life() {
        let posted = Utc::now() - chrono::Duration::days(14);
        let score = freshness_score(Some(posted), 14.0).unwrap();
        assert!((score - 0.5).abs() < 0.01);
    }

    #[test]
    fn freshness_score_none_without_posted_at() {
        assert_eq!(freshness_score(None, 14.0), None);
    }

    #[test]
    fn posted_at_parses_common_shapes() {
        assert!(parse_posted_at("2024-03-15").is_some());
        assert!(parse_posted_at("03/15/2024").is_some());
        assert!(parse_posted_at("March 15, 2024").is_some());
        assert!(parse_posted_at("not a date").is_none());
    }
}
