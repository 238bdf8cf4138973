//! Thin managed HTTP client. All calls pass through the
//! Rate Limiter; the Fetcher itself does not interpret content-type —
//! callers sniff the first non-whitespace byte to pick JSON vs HTML.

use crate::error::{FetchError, RenderError};
use crate::rate_limiter::RateLimiter;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// `fetch(url)` outcome: body bytes are `None` on any non-2xx status,
/// but the status code is always returned so callers can act on 404s.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub body: Option<Vec<u8>>,
    pub status: u16,
    pub final_url: String,
}

/// Boundary the rest of the crate fetches through. `HttpFetcher` is the
/// production `reqwest` implementation; tests substitute a scripted
/// stub so the Detector/Crawl/Enrichment/Maintenance/Discovery paths
/// can be driven end-to-end without real network calls (mirrors the
/// teacher's `WebCrawler` trait in `intelligent-crawler/src/crawler.rs`,
/// kept "to allow mocking").
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;
    async fn fetch_with_timeout(&self, url: &str, timeout: Duration) -> Result<FetchOutcome, FetchError>;
    async fn head(&self, url: &str) -> Result<FetchOutcome, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    rate_limiter: Arc<RateLimiter>,
    default_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(
        user_agent: impl Into<String>,
        default_timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            user_agent: user_agent.into(),
            rate_limiter,
            default_timeout,
        }
    }

}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        self.fetch_with_timeout(url, self.default_timeout).await
    }

    async fn fetch_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        self.rate_limiter.acquire(url).await;

        debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    warn!(url, error = %e, "fetch failed");
                    FetchError::Network { url: url.to_string(), source: e }
                }
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if !response.status().is_success() {
            return Ok(FetchOutcome {
                body: None,
                status,
                final_url,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network { url: url.to_string(), source: e })?;

        Ok(FetchOutcome {
            body: Some(bytes.to_vec()),
            status,
            final_url,
        })
    }

    /// Resolves redirects without downloading the body — used by the
    /// Detector's parent-redirect check and by the ATS Prober.
    async fn head(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        self.rate_limiter.acquire(url).await;

        let response = self
            .client
            .head(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    FetchError::Network { url: url.to_string(), source: e }
                }
            })?;

        Ok(FetchOutcome {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
            body: None,
        })
    }
}

/// Scripted `Fetcher` for unit/integration tests. Responses are queued
/// per exact URL; a `fetch`/`head` pops the front of that URL's queue,
/// falling back to a bare 404 when nothing was scripted for it, so a
/// stub never panics on an unexpected call — it just reports "not found"
/// the way a real 404 would.
pub struct StubFetcher {
    responses: std::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<FetchOutcome>>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Queue one response for `url`; repeated calls to the same URL
    /// return responses in the order they were queued, letting a test
    /// script a retry sequence (e.g. 404 then 200 after rediscovery).
    pub fn push(&self, url: impl Into<String>, outcome: FetchOutcome) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn push_ok(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> &Self {
        let url = url.into();
        self.push(
            url.clone(),
            FetchOutcome {
                body: Some(body.into()),
                status: 200,
                final_url: url,
            },
        )
    }

    pub fn push_status(&self, url: impl Into<String>, status: u16) -> &Self {
        let url = url.into();
        self.push(
            url.clone(),
            FetchOutcome {
                body: None,
                status,
                final_url: url,
            },
        )
    }

    /// Like `push_ok` but records `final_url` as a redirect target
    /// distinct from the requested URL (parent-redirect detection).
    pub fn push_redirect(&self, url: impl Into<String>, final_url: impl Into<String>, body: impl Into<Vec<u8>>) -> &Self {
        self.push(
            url.into(),
            FetchOutcome {
                body: Some(body.into()),
                status: 200,
                final_url: final_url.into(),
            },
        )
    }
}

impl Default for StubFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let mut guard = self.responses.lock().unwrap();
        match guard.get_mut(url).and_then(|q| q.pop_front()) {
            Some(outcome) => Ok(outcome),
            None => Ok(FetchOutcome {
                body: None,
                status: 404,
                final_url: url.to_string(),
            }),
        }
    }

    async fn fetch_with_timeout(&self, url: &str, _timeout: Duration) -> Result<FetchOutcome, FetchError> {
        self.fetch(url).await
    }

    async fn head(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        self.fetch(url).await
    }
}

/// Boundary onto the headless-browser pool spec.md §1 names as an
/// external collaborator consumed "via a `render(url) -> HTML`
/// capability" — the pool itself is out of scope, this trait is the
/// seam `crawl.rs`/`maintenance.rs` call for `AtsFamily::Custom`
/// companies instead of a plain `Fetcher::fetch`. Shaped like `Fetcher`
/// so a production implementation can reuse `FetchOutcome` rather than
/// inventing a parallel result type.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<FetchOutcome, RenderError>;
}

/// Scripted `Renderer` double for tests, mirroring `StubFetcher`.
pub struct StubRenderer {
    responses: std::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<FetchOutcome>>>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn push_ok(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> &Self {
        let url = url.into();
        self.responses
            .lock()
            .unwrap()
            .entry(url.clone())
            .or_default()
            .push_back(FetchOutcome {
                body: Some(body.into()),
                status: 200,
                final_url: url,
            });
        self
    }
}

impl Default for StubRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, url: &str) -> Result<FetchOutcome, RenderError> {
        let mut guard = self.responses.lock().unwrap();
        match guard.get_mut(url).and_then(|q| q.pop_front()) {
            Some(outcome) => Ok(outcome),
            None => Err(RenderError::Failed {
                url: url.to_string(),
                reason: "no scripted render response queued".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_outcome_carries_status_even_without_body() {
        let outcome = FetchOutcome {
            body: None,
            status: 404,
            final_url: "https://boards-api.greenhouse.io/v1/boards/acme-old/jobs".into(),
        };
        assert!(outcome.body.is_none());
        assert_eq!(outcome.status, 404);
    }

    #[tokio::test]
    async fn stub_fetcher_replays_queued_responses_in_order_then_falls_back_to_404() {
        let stub = StubFetcher::new();
        stub.push_status("https://acme.com/careers", 404);
        stub.push_ok("https://acme.com/careers", b"<html></html>".to_vec());

        let first = stub.fetch("https://acme.com/careers").await.unwrap();
        assert_eq!(first.status, 404);
        let second = stub.fetch("https://acme.com/careers").await.unwrap();
        assert_eq!(second.status, 200);
        let third = stub.fetch("https://acme.com/careers").await.unwrap();
        assert_eq!(third.status, 404);
        assert!(third.body.is_none());
    }

    #[tokio::test]
    async fn stub_renderer_errors_when_no_response_queued() {
        let stub = StubRenderer::new();
        let err = stub.render("https://acme.com/careers").await.unwrap_err();
        assert!(matches!(err, crate::error::RenderError::Failed { .. }));
    }

    #[tokio::test]
    async fn stub_renderer_replays_queued_html() {
        let stub = StubRenderer::new();
        stub.push_ok("https://acme.com/careers", b"<html>rendered</html>".to_vec());
        let outcome = stub.render("https://acme.com/careers").await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body.as_deref(), Some(b"<html>rendered</html>".as_slice()));
    }
}
