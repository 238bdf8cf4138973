//! Network crawler source. For each Company not yet
//! crawled-for-network, fetches a curated set of paths in parallel
//! and extracts outbound link domains; each new domain is then probed
//! for a careers page.

use crate::discovery::{DiscoverySource, ProgressTracker, SourceContext};
use crate::error::DiscoveryError;
use crate::html_utils;
use crate::models::{Company, DiscoveredCompany, DiscoverySourceKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use url::Url;

const CURATED_PATHS: &[&str] = &["/", "/customers", "/partners", "/portfolio", "/logos", "/case-studies"];
const CAREERS_PATHS: &[&str] = &["/careers", "/jobs"];

pub struct NetworkCrawlerSource {
    limit: i64,
    company_concurrency: usize,
    path_concurrency: usize,
}

impl NetworkCrawlerSource {
    pub fn new(limit: i64, company_concurrency: usize, path_concurrency: usize) -> Self {
        Self { limit, company_concurrency, path_concurrency }
    }
}

#[async_trait]
impl DiscoverySource for NetworkCrawlerSource {
    fn kind(&self) -> DiscoverySourceKind {
        DiscoverySourceKind::NetworkCrawler
    }

    fn name(&self) -> &str {
        "network_crawler"
    }

    async fn discover(
        &self,
        ctx: &SourceContext,
        progress: &ProgressTracker,
        tx: &mpsc::Sender<(DiscoverySourceKind, DiscoveredCompany)>,
    ) -> Result<(), DiscoveryError> {
        let companies = ctx.storage.list_companies_for_network_crawl(self.limit).await?;
        progress.set_total(companies.len() as i64);

        let company_semaphore = Arc::new(Semaphore::new(self.company_concurrency.max(1)));
        let path_semaphore = Arc::new(Semaphore::new(self.path_concurrency.max(1)));
        let mut handles = Vec::new();

        for company in companies {
            let fetcher = ctx.fetcher.clone();
            let company_semaphore = company_semaphore.clone();
            let path_semaphore = path_semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = company_semaphore.acquire_owned().await.expect("semaphore closed");
                crawl_company_paths(&company, fetcher, &path_semaphore).await
            }));
        }

        let mut crawled_companies = Vec::new();
        let mut all_domains = HashSet::new();
        for handle in handles {
            progress.increment();
            if let Ok((company, domains)) = handle.await {
                for domain in domains {
                    all_domains.insert(domain);
                }
                crawled_companies.push(company);
            }
        }

        for domain in all_domains {
            if ctx.dedup.is_duplicate_domain(&domain).await {
                continue;
            }
            let careers_url = probe_careers_url(&ctx.fetcher, &domain).await;
            let candidate = DiscoveredCompany {
                name: domain.clone(),
                domain: Some(domain),
                careers_url,
                ..Default::default()
            };
            if tx.send((self.kind(), candidate)).await.is_err() {
                break;
            }
        }

        // Sequential reopen-a-session pass to mark companies crawled,
        // gather() never holds a session across its tasks.
        for mut company in crawled_companies {
            company.last_crawled_for_network = Some(chrono::Utc::now());
            ctx.storage.update_company(&company).await?;
        }
        Ok(())
    }
}

async fn crawl_company_paths(
    company: &Company,
    fetcher: Arc<dyn crate::http_fetcher::Fetcher>,
    path_semaphore: &Arc<Semaphore>,
) -> (Company, HashSet<String>) {
    let Some(base) = company.website_url.clone().or_else(|| company.domain.clone().map(|d| format!("https://{d}"))) else {
        return (company.clone(), HashSet::new());
    };
    let Ok(base_url) = Url::parse(&base) else {
        return (company.clone(), HashSet::new());
    };

    let mut handles = Vec::new();
    for path in CURATED_PATHS {
        let Ok(url) = base_url.join(path) else { continue };
        let fetcher = fetcher.clone();
        let semaphore = path_semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            fetcher.fetch(url.as_str()).await.ok()
        }));
    }

    let mut domains = HashSet::new();
    for handle in handles {
        if let Ok(Some(outcome)) = handle.await {
            if let Some(body) = outcome.body {
                let html = String::from_utf8_lossy(&body);
                for link in html_utils::extract_links(&base_url, &html) {
                    if let Some(domain) = html_utils::domain_from_url(&link) {
                        if Some(&domain) != company.domain.as_ref() {
                            domains.insert(domain);
                        }
                    }
                }
            }
        }
    }
    (company.clone(), domains)
}

async fn probe_careers_url(fetcher: &dyn crate::http_fetcher::Fetcher, domain: &str) -> Option<String> {
    for path in CAREERS_PATHS {
        let url = format!("https://{domain}{path}");
        if let Ok(outcome) = fetcher.head(&url).await {
            if outcome.status >= 200 && outcome.status < 300 {
                return Some(url);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_paths_cover_the_expected_set() {
        assert!(CURATED_PATHS.contains(&"/partners"));
        assert!(CURATED_PATHS.contains(&"/portfolio"));
        assert!(CURATED_PATHS.contains(&"/logos"));
    }
}
