//! HTML scraping helpers shared by the Detector, Extractors, and
//! Discovery Sources. No headless browser — plain regex passes, same
//! idiom as the HTTP ingestor this is grounded on.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref SCRIPT_TAG: Regex = Regex::new(r"(?s)<script[^>]*>.*?</script>").unwrap();
    static ref STYLE_TAG: Regex = Regex::new(r"(?s)<style[^>]*>.*?</style>").unwrap();
    static ref H1_TAG: Regex = Regex::new(r"(?s)<h1[^>]*>(.*?)</h1>").unwrap();
    static ref H2_TAG: Regex = Regex::new(r"(?s)<h2[^>]*>(.*?)</h2>").unwrap();
    static ref H3_TAG: Regex = Regex::new(r"(?s)<h3[^>]*>(.*?)</h3>").unwrap();
    static ref P_TAG: Regex = Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap();
    static ref BR_TAG: Regex = Regex::new(r"<br\s*/?>").unwrap();
    static ref A_TAG: Regex =
        Regex::new(r#"(?s)<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    static ref LI_TAG: Regex = Regex::new(r"(?s)<li[^>]*>(.*?)</li>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref MULTI_NEWLINE: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref TITLE_TAG: Regex = Regex::new(r"(?s)<title[^>]*>(.*?)</title>").unwrap();
    static ref HREF_ATTR: Regex = Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap();
}

/// A conservative HTML→markdown pass: strips scripts/styles, converts
/// headings/paragraphs/links/lists, drops the rest of the tags.
pub fn html_to_markdown(html: &str) -> String {
    let mut text = html.to_string();
    text = SCRIPT_TAG.replace_all(&text, "").to_string();
    text = STYLE_TAG.replace_all(&text, "").to_string();
    text = H1_TAG.replace_all(&text, "# $1\n").to_string();
    text = H2_TAG.replace_all(&text, "## $1\n").to_string();
    text = H3_TAG.replace_all(&text, "### $1\n").to_string();
    text = P_TAG.replace_all(&text, "$1\n\n").to_string();
    text = BR_TAG.replace_all(&text, "\n").to_string();
    text = A_TAG.replace_all(&text, "[$2]($1)").to_string();
    text = LI_TAG.replace_all(&text, "- $1\n").to_string();
    text = ANY_TAG.replace_all(&text, "").to_string();
    text = MULTI_NEWLINE.replace_all(&text, "\n\n").to_string();
    text = decode_entities(&text);
    text.trim().to_string()
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

pub fn extract_title(html: &str) -> Option<String> {
    TITLE_TAG
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
}

/// All `href`s resolved against `base`, skipping anchors/js/mailto/tel.
pub fn extract_links(base: &Url, html: &str) -> Vec<String> {
    let mut links = Vec::new();
    for cap in HREF_ATTR.captures_iter(html) {
        let Some(href) = cap.get(1) else { continue };
        let href = href.as_str();
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            links.push(resolved.to_string());
        }
    }
    links
}

/// The registrable domain, lowercased, with a leading `www.` stripped —
/// the normalization the Deduplication Service applies.
pub fn normalize_domain(domain: &str) -> String {
    let lower = domain.trim().to_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}

pub fn domain_from_url(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(normalize_domain))
}

/// Canonicalizes a job's source URL for dedup comparison: lowercase,
/// strip trailing slash, strip query string.
pub fn normalize_source_url(url: &str) -> String {
    let mut s = url.trim().to_lowercase();
    if let Some(idx) = s.find('?') {
        s.truncate(idx);
    }
    while s.ends_with('/') && s.len() > "https://".len() {
        s.pop();
    }
    s
}

/// First non-whitespace byte decides JSON vs HTML.
pub enum ResponseBody {
    Json(serde_json::Value),
    Html(String),
}

pub fn sniff_response_body(bytes: &[u8]) -> ResponseBody {
    let text = String::from_utf8_lossy(bytes);
    let first_non_ws = text.trim_start().chars().next();
    if matches!(first_non_ws, Some('{') | Some('[')) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim_start()) {
            return ResponseBody::Json(value);
        }
    }
    ResponseBody::Html(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_conversion_preserves_structure() {
        let html = "<h1>Title</h1><p>Body text.</p><a href=\"https://x.com\">Link</a>";
        let md = html_to_markdown(html);
        assert!(md.contains("# Title"));
        assert!(md.contains("Body text."));
        assert!(md.contains("[Link](https://x.com)"));
    }

    #[test]
    fn links_skip_non_navigational_hrefs() {
        let base = Url::parse("https://example.com/careers").unwrap();
        let html = r#"<a href="/jobs">Jobs</a><a href="#top">Top</a><a href="javascript:void(0)">JS</a>"#;
        let links = extract_links(&base, html);
        assert_eq!(links, vec!["https://example.com/jobs".to_string()]);
    }

    #[test]
    fn domain_normalization_strips_www_and_lowercases() {
        assert_eq!(normalize_domain("WWW.Acme.com"), "acme.com");
        assert_eq!(normalize_domain("acme.com"), "acme.com");
    }

    #[test]
    fn source_url_normalization_strips_query_and_trailing_slash() {
        assert_eq!(
            normalize_source_url("HTTPS://Boards.Greenhouse.io/Acme/jobs/1?gh_src=abc/"),
            "https://boards.greenhouse.io/acme/jobs/1"
        );
    }

    #[test]
    fn sniffs_json_vs_html() {
        assert!(matches!(sniff_response_body(b"  [1,2,3]"), ResponseBody::Json(_)));
        assert!(matches!(sniff_response_body(b"<html></html>"), ResponseBody::Html(_)));
    }
}
