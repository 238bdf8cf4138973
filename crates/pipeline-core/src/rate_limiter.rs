//! Per-host minimum inter-call delay. Unlike a token-bucket limiter,
//! a minimum-delay limiter only has to remember the last call time
//! per host, so it is hand-rolled here over a plain mutex map rather
//! than pulling in a token-bucket crate.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Process-wide, mutable, owned once by the Pipeline Orchestrator and
/// shared by reference — not a singleton.
pub struct RateLimiter {
    default_min_delay: Duration,
    host_overrides: HashMap<String, Duration>,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(default_min_delay: Duration) -> Self {
        Self {
            default_min_delay,
            host_overrides: HashMap::new(),
            last_call: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_host_overrides(mut self, overrides: HashMap<String, Duration>) -> Self {
        self.host_overrides = overrides;
        self
    }

    fn min_delay_for(&self, host: &str) -> Duration {
        self.host_overrides
            .get(host)
            .copied()
            .unwrap_or(self.default_min_delay)
    }

    /// Extracts the host from a URL string; falls back to the whole
    /// string if it doesn't parse, so callers always get *some* key.
    fn host_key(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url.to_string())
    }

    /// Sleeps `max(0, last[H] + min_delay - now())`, then stamps `now()`
    /// as the new `last[H]` before releasing the lock, so the mutation
    /// never straddles the sleep (no mutex held across a
    /// suspension point other than this one's timestamp update).
    pub async fn acquire(&self, url: &str) {
        let host = Self::host_key(url);
        let min_delay = self.min_delay_for(&host);

        let wait = {
            let guard = self.last_call.lock().await;
            match guard.get(&host) {
                Some(last) => min_delay.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut guard = self.last_call.lock().await;
        guard.insert(host, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn second_call_to_same_host_is_delayed() {
        let limiter = RateLimiter::new(StdDuration::from_millis(50));
        let start = Instant::now();
        limiter.acquire("https://boards-api.greenhouse.io/v1/boards/acme/jobs").await;
        limiter.acquire("https://boards-api.greenhouse.io/v1/boards/acme/jobs/1").await;
        assert!(start.elapsed() >= StdDuration::from_millis(45));
    }

    #[tokio::test]
    async fn distinct_hosts_do_not_serialize() {
        let limiter = RateLimiter::new(StdDuration::from_millis(200));
        let start = Instant::now();
        limiter.acquire("https://boards-api.greenhouse.io/v1/boards/acme/jobs").await;
        limiter.acquire("https://jobs.lever.co/acme?mode=json").await;
        assert!(start.elapsed() < StdDuration::from_millis(100));
    }

    #[tokio::test]
    async fn host_override_wins_over_default() {
        let mut overrides = HashMap::new();
        overrides.insert("api.ashbyhq.com".to_string(), StdDuration::from_millis(10));
        let limiter = RateLimiter::new(StdDuration::from_millis(500)).with_host_overrides(overrides);
        let start = Instant::now();
        limiter.acquire("https://api.ashbyhq.com/posting-api/job-board/acme").await;
        limiter
            .acquire("https://api.ashbyhq.com/posting-api/job-board/acme/posting/1")
            .await;
        assert!(start.elapsed() < StdDuration::from_millis(200));
    }
}
