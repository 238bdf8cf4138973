//! The Detector, five ordered steps, short-circuiting on the
//! first positive identification, plus parent-redirect handling.

use crate::ats::registry::{self, AtsRegistryEntry};
use crate::error::DetectError;
use crate::html_utils;
use crate::http_fetcher::Fetcher;
use crate::models::AtsFamily;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    pub family: AtsFamily,
    pub identifier: Option<String>,
    /// Set only for `AtsFamily::UsesParentAts`.
    pub parent_redirect_domain: Option<String>,
}

pub struct Detector<'a> {
    fetcher: &'a dyn Fetcher,
}

impl<'a> Detector<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self { fetcher }
    }

    /// Runs the full pipeline starting from a careers URL: fetches the
    /// page, then detects from the URL shape and HTML. Also resolves
    /// the parent-redirect case.
    pub async fn detect_from_careers_url(
        &self,
        careers_url: &str,
        company_domain: Option<&str>,
    ) -> Result<DetectionResult, DetectError> {
        // A step only short-circuits the whole pipeline once it has
        // produced a family *with* a usable identifier. A family match
        // with no identifier is kept as `best` and the later steps
        // (embeds, job-link recursion, structured extraction) keep
        // running to try to resolve one — otherwise a capture-less
        // keyword match (e.g. the bare `greenhouse.io` substring that
        // appears in the vendor's own embed snippet, well before any
        // `data-board-token` attribute) would swallow the identifier a
        // later, more specific pattern would have found.
        let mut best: Option<DetectionResult> = None;

        if let Some(result) = detect_from_url(careers_url) {
            if result.identifier.is_some() {
                return Ok(result);
            }
            best.get_or_insert(result);
        }

        let outcome = self.fetcher.fetch(careers_url).await?;

        if let Some(domain) = company_domain {
            if let Some(parent) = parent_redirect(&outcome.final_url, domain) {
                info!(domain, parent, "careers fetch redirected to parent domain");
                return Ok(DetectionResult {
                    family: AtsFamily::UsesParentAts,
                    identifier: Some(parent.clone()),
                    parent_redirect_domain: Some(parent),
                });
            }
        }

        let Some(body) = outcome.body else {
            return best.ok_or(DetectError::NoMatch);
        };
        let html = String::from_utf8_lossy(&body).into_owned();

        if let Some(result) = detect_from_url(&outcome.final_url) {
            if result.identifier.is_some() {
                return Ok(result);
            }
            best.get_or_insert(result);
        }
        if let Some(result) = detect_from_html(&html) {
            if result.identifier.is_some() {
                return Ok(result);
            }
            best.get_or_insert(result);
        }
        if let Some(result) = detect_from_embeds(&html) {
            if result.identifier.is_some() {
                return Ok(result);
            }
            best.get_or_insert(result);
        }
        if let Some(result) = self.detect_from_job_links(&outcome.final_url, &html).await {
            if result.identifier.is_some() {
                return Ok(result);
            }
            best.get_or_insert(result);
        }
        if let Some(result) = detect_structured(&html) {
            return Ok(result);
        }

        best.ok_or(DetectError::NoMatch)
    }

    /// Step 4: follow up to three plausible job-link URLs and recurse.
    async fn detect_from_job_links(&self, base_url: &str, html: &str) -> Option<DetectionResult> {
        let base = Url::parse(base_url).ok()?;
        let links = html_utils::extract_links(&base, html);
        let candidates: Vec<&String> = links
            .iter()
            .filter(|l| looks_like_job_link(l))
            .take(3)
            .collect();

        for link in candidates {
            if let Some(result) = detect_from_url(link) {
                return Some(result);
            }
            if let Ok(outcome) = self.fetcher.fetch(link).await {
                if let Some(result) = detect_from_url(&outcome.final_url) {
                    return Some(result);
                }
                if let Some(body) = outcome.body {
                    let html = String::from_utf8_lossy(&body);
                    if let Some(result) = detect_from_html(&html) {
                        return Some(result);
                    }
                }
            }
        }
        None
    }
}

fn looks_like_job_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    ["career", "job", "hiring", "apply", "open-position"]
        .iter()
        .any(|kw| lower.contains(kw))
}

/// Step 1: URL-shape match against every family's `url_patterns`.
fn detect_from_url(url: &str) -> Option<DetectionResult> {
    for entry in registry::registry() {
        for pattern in &entry.url_patterns {
            if let Some(cap) = pattern.captures(url) {
                let identifier = cap.get(1).map(|m| m.as_str().to_string());
                return Some(finalize(entry, identifier));
            }
        }
    }
    None
}

/// Step 2: HTML-body keyword match. Within one family's pattern list, a
/// capturing match is preferred over an earlier capture-less one — a
/// keyword-only pattern (e.g. a bare vendor-domain substring) must not
/// shadow a later pattern in the same list that would have resolved an
/// identifier.
fn detect_from_html(html: &str) -> Option<DetectionResult> {
    for entry in registry::registry() {
        if let Some(result) = best_match_in_entry(entry, &entry.html_patterns, html) {
            return Some(result);
        }
    }
    None
}

/// Step 3: embed script / iframe match. Same capturing-preferred scan
/// as `detect_from_html`.
fn detect_from_embeds(html: &str) -> Option<DetectionResult> {
    for entry in registry::registry() {
        if let Some(result) = best_match_in_entry(entry, &entry.embed_patterns, html) {
            return Some(result);
        }
    }
    None
}

/// Scans one entry's pattern list against `haystack`; a pattern that
/// captures an identifier wins over an earlier capture-less match from
/// the same list.
fn best_match_in_entry(
    entry: &AtsRegistryEntry,
    patterns: &[regex::Regex],
    haystack: &str,
) -> Option<DetectionResult> {
    let mut keyword_only = false;
    for pattern in patterns {
        if let Some(cap) = pattern.captures(haystack) {
            if let Some(m) = cap.get(1) {
                return Some(finalize(entry, Some(m.as_str().to_string())));
            }
            keyword_only = true;
        }
    }
    keyword_only.then(|| finalize(entry, None))
}

/// Step 5: structured identifier extraction once a family is already
/// implied by HTML but no capture group yielded an identifier — applies
/// data-attribute, inline-JS-config, and embed-URL extraction in order.
fn detect_structured(html: &str) -> Option<DetectionResult> {
    for entry in registry::registry() {
        if !entry.html_patterns.iter().any(|p| p.is_match(html)) {
            continue;
        }
        if let Some(id) = extract_data_attribute_identifier(html) {
            return Some(finalize(entry, Some(id)));
        }
        if let Some(id) = extract_inline_config_identifier(html, entry.family) {
            return Some(finalize(entry, Some(id)));
        }
    }
    None
}

fn extract_data_attribute_identifier(html: &str) -> Option<String> {
    let re = regex::Regex::new(r#"(?i)data-(?:board-token|account|company)=["']([a-zA-Z0-9_-]+)["']"#).ok()?;
    re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn extract_inline_config_identifier(html: &str, family: AtsFamily) -> Option<String> {
    let key = match family {
        AtsFamily::Greenhouse => "boardToken",
        AtsFamily::Lever => "site",
        AtsFamily::Ashby => "jobBoardName",
        AtsFamily::Workable => "accountSubdomain",
        _ => return None,
    };
    let pattern = format!(r#"(?i){}["']?\s*[:=]\s*["']([a-zA-Z0-9_-]+)["']"#, key);
    let re = regex::Regex::new(&pattern).ok()?;
    re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn finalize(entry: &AtsRegistryEntry, identifier: Option<String>) -> DetectionResult {
    let identifier = identifier.filter(|id| {
        entry.family != AtsFamily::Greenhouse || !registry::is_blocklisted(id)
    });
    debug!(family = %entry.family, ?identifier, "ATS detected");
    DetectionResult {
        family: entry.family,
        identifier,
        parent_redirect_domain: None,
    }
}

/// If a careers fetch for `domain` ends on a different registrable
/// domain that is not itself a known ATS host, the caller treats the
/// source Company as a subsidiary.
pub fn parent_redirect(final_url: &str, domain: &str) -> Option<String> {
    let final_domain = html_utils::domain_from_url(final_url)?;
    let source_domain = html_utils::normalize_domain(domain);
    if final_domain == source_domain {
        return None;
    }
    let is_known_ats_host = registry::registry()
        .iter()
        .any(|e| e.url_patterns.iter().any(|p| p.is_match(final_url)));
    if is_known_ats_host {
        return None;
    }
    Some(final_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_greenhouse_from_careers_url() {
        let result = detect_from_url("https://boards.greenhouse.io/acme").unwrap();
        assert_eq!(result.family, AtsFamily::Greenhouse);
        assert_eq!(result.identifier.as_deref(), Some("acme"));
    }

    #[test]
    fn detects_greenhouse_from_board_token_attribute() {
        let html = r#"<div data-board-token="acme" class="gh-embed"></div>"#;
        let result = detect_from_html(html).unwrap();
        assert_eq!(result.family, AtsFamily::Greenhouse);
        assert_eq!(result.identifier.as_deref(), Some("acme"));
    }

    #[test]
    fn parent_redirect_skips_known_ats_hosts() {
        // Redirect to a known ATS host is ordinary detection, not a subsidiary case.
        assert!(parent_redirect("https://boards.greenhouse.io/other-co", "acme.com").is_none());
        assert_eq!(
            parent_redirect("https://parentco.com/careers", "acme.com").as_deref(),
            Some("parentco.com")
        );
        assert!(parent_redirect("https://acme.com/careers", "acme.com").is_none());
    }

    #[test]
    fn blocklisted_identifier_is_cleared_for_greenhouse() {
        let entry = registry::entry_for(AtsFamily::Greenhouse).unwrap();
        let result = finalize(entry, Some("embed".to_string()));
        assert_eq!(result.identifier, None);
    }

    /// A bespoke careers page embedding the real Greenhouse vendor
    /// snippet contains the bare `greenhouse.io` substring with no
    /// `data-board-token` attribute anywhere on the page — the
    /// identifier only lives in the embed script's `?for=` query
    /// param. Step 2 (keyword match) must not short-circuit on the
    /// capture-less `greenhouse.io` pattern before step 3 (embeds) gets
    /// a chance to resolve the identifier.
    #[tokio::test]
    async fn resolves_identifier_from_embed_when_html_keyword_has_no_capture() {
        let html = r#"<html><body>
            <h1>Careers at Acme</h1>
            <script src="https://boards.greenhouse.io/embed/job_board/js?for=acme"></script>
        </body></html>"#;
        let stub = crate::http_fetcher::StubFetcher::new();
        stub.push_ok("https://acme.com/careers", html.as_bytes().to_vec());
        let detector = Detector::new(&stub);

        let result = detector
            .detect_from_careers_url("https://acme.com/careers", Some("acme.com"))
            .await
            .unwrap();

        assert_eq!(result.family, AtsFamily::Greenhouse);
        assert_eq!(result.identifier.as_deref(), Some("acme"));
    }
}
