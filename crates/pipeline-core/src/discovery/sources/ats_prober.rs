//! ATS Prober source. For each Company lacking an ATS, synthesizes
//! candidate slugs from its name and domain, HEADs the family
//! careers URL, and on 200 fetches the page to verify the
//! board's embedded company URL matches the expected domain (a
//! cross-ATS collision guard — two different companies can pick the
//! same slug on the same vendor).

use crate::ats::registry;
use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::models::{AtsFamily, Company, DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

pub struct AtsProberSource {
    limit: i64,
    concurrency: usize,
}

impl AtsProberSource {
    pub fn new(limit: i64, concurrency: usize) -> Self {
        Self { limit, concurrency }
    }
}

#[async_trait]
impl DiscoverySource for AtsProberSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::AtsProber
    }

    fn name(&self) -> &str {
        "ats_prober"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        let companies: Vec<Company> = ctx
            .storage
            .list_companies_for_crawl(None, self.limit)
            .await?
            .into_iter()
            .filter(|c| c.ats_family.is_none())
            .collect();
        progress.set_total(companies.len() as i64);

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::new();
        for company in companies {
            let fetcher = ctx.fetcher.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                probe_company(&company, &fetcher).await
            }));
        }

        for handle in handles {
            progress.increment();
            if let Ok(Some(candidate)) = handle.await {
                if tx.send((self.kind(), candidate)).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

fn candidate_slugs(company: &Company) -> Vec<String> {
    let mut slugs = Vec::new();
    let name_slug = slugify(&company.name);
    if !name_slug.is_empty() {
        slugs.push(name_slug);
    }
    if let Some(domain) = &company.domain {
        if let Some(base) = domain.split('.').next() {
            let base = base.to_lowercase();
            if !slugs.contains(&base) {
                slugs.push(base);
            }
        }
    }
    slugs
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

async fn probe_company(company: &Company, fetcher: &dyn crate::http_fetcher::Fetcher) -> Option<DiscoveredCompany> {
    let slugs = candidate_slugs(company);
    let company_domain = company.domain.as_deref();

    for entry in registry::registry() {
        for slug in &slugs {
            if !entry.identifier_is_valid(slug) {
                continue;
            }
            let careers_url = entry.careers_url_for(slug);
            let Ok(head) = fetcher.head(&careers_url).await else { continue };
            if head.status < 200 || head.status >= 300 {
                continue;
            }
            if !verify_ownership(entry.family, slug, company_domain, &careers_url, fetcher).await {
                continue;
            }
            let mut candidate = DiscoveredCompany {
                name: company.name.clone(),
                domain: company.domain.clone(),
                careers_url: Some(careers_url),
                ats_family: Some(entry.family),
                ats_identifier: Some(slug.clone()),
                ..Default::default()
            };
            candidate.website_url = company.website_url.clone();
            return Some(candidate);
        }
    }
    None
}

/// Fetches the candidate careers page and checks that the embedded
/// board token / company URL is consistent with the Company's own
/// domain, so two distinct companies that happen to share a slug on
/// the same vendor don't get cross-attributed.
async fn verify_ownership(
    family: AtsFamily,
    slug: &str,
    company_domain: Option<&str>,
    careers_url: &str,
    fetcher: &dyn crate::http_fetcher::Fetcher,
) -> bool {
    let Ok(outcome) = fetcher.fetch(careers_url).await else { return false };
    let Some(body) = outcome.body else { return false };
    let html = String::from_utf8_lossy(&body);

    if let Some(entry) = registry::entry_for(family) {
        let matches_slug = entry
            .url_patterns
            .iter()
            .chain(entry.html_patterns.iter())
            .any(|p| p.is_match(&html) || p.is_match(careers_url));
        if !matches_slug {
            return false;
        }
    }

    // When the page names the company's own domain anywhere, that is
    // strong positive evidence; absent that, accept on slug match
    // alone (self-hosted career pages rarely echo the domain back).
    match company_domain {
        Some(domain) => html.to_lowercase().contains(&domain.to_lowercase()) || !html_contains_other_company(&html, slug),
        None => true,
    }
}

/// A weak collision signal: if the page content names a `data-*`
/// identifier that doesn't match our candidate slug at all, treat it
/// as evidence this board belongs to someone else.
fn html_contains_other_company(html: &str, slug: &str) -> bool {
    html_utils::extract_title(html)
        .map(|title| !title.to_lowercase().contains(&slug.to_lowercase()) && title.len() > 3)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_punctuation_and_case() {
        assert_eq!(slugify("Acme, Inc."), "acme-inc");
        assert_eq!(slugify("Foo & Bar Corp"), "foo-bar-corp");
    }

    #[test]
    fn candidate_slugs_include_name_and_domain_base() {
        let mut company = Company::new("Acme Robotics");
        company.domain = Some("acme.com".to_string());
        let slugs = candidate_slugs(&company);
        assert!(slugs.contains(&"acme-robotics".to_string()));
        assert!(slugs.contains(&"acme".to_string()));
    }
}
