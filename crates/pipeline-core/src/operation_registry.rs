//! Process-wide mutual exclusion by operation key. Guards
//! same-keyed operations from running concurrently while leaving
//! distinct keys (`crawl_greenhouse` vs `crawl_lever`, `embeddings`)
//! free to run in parallel.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct OperationState {
    pub started_at: DateTime<Utc>,
    pub step: Option<String>,
    pub progress: Option<(i64, Option<i64>)>,
}

#[derive(Clone, Default)]
pub struct OperationRegistry {
    inner: Arc<Mutex<HashMap<String, OperationState>>>,
}

/// RAII guard: dropping it (on any exit path, including `?`/panic
/// unwind) releases the key via `end`.
pub struct OperationGuard {
    registry: OperationRegistry,
    key: String,
    released: bool,
}

impl OperationGuard {
    pub async fn release(mut self) {
        self.registry.end(&self.key).await;
        self.released = true;
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let registry = self.registry.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            registry.end(&key).await;
        });
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` if `key` is already running; `Some(guard)`
    /// otherwise, with the guard releasing the key when dropped.
    pub async fn start(&self, key: impl Into<String>) -> Option<OperationGuard> {
        let key = key.into();
        let mut guard = self.inner.lock().await;
        if guard.contains_key(&key) {
            return None;
        }
        guard.insert(
            key.clone(),
            OperationState {
                started_at: Utc::now(),
                step: None,
                progress: None,
            },
        );
        drop(guard);
        Some(OperationGuard {
            registry: self.clone(),
            key,
            released: false,
        })
    }

    pub async fn end(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }

    pub async fn is_running(&self, key: &str) -> bool {
        self.inner.lock().await.contains_key(key)
    }

    pub async fn set_progress(&self, key: &str, step: Option<String>, progress: Option<(i64, Option<i64>)>) {
        if let Some(state) = self.inner.lock().await.get_mut(key) {
            state.step = step;
            state.progress = progress;
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, OperationState> {
        self.inner.lock().await.clone()
    }
}

pub fn crawl_key(family: Option<crate::models::AtsFamily>) -> String {
    match family {
        Some(family) => format!("crawl_{}", family.as_str()),
        None => "crawl_all".to_string(),
    }
}

pub fn enrich_key(family: Option<crate::models::AtsFamily>) -> String {
    match family {
        Some(family) => format!("enrich_{}", family.as_str()),
        None => "enrich_all".to_string(),
    }
}

pub const DISCOVERY_KEY: &str = "discovery";
pub const EMBEDDINGS_KEY: &str = "embeddings";
pub const FULL_PIPELINE_KEY: &str = "full_pipeline";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AtsFamily;

    #[tokio::test]
    async fn second_start_on_same_key_fails_while_first_is_held() {
        let registry = OperationRegistry::new();
        let first = registry.start("discovery").await;
        assert!(first.is_some());
        let second = registry.start("discovery").await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn distinct_keys_run_concurrently() {
        let registry = OperationRegistry::new();
        let crawl_gh = registry.start(crawl_key(Some(AtsFamily::Greenhouse))).await;
        let crawl_lever = registry.start(crawl_key(Some(AtsFamily::Lever))).await;
        assert!(crawl_gh.is_some());
        assert!(crawl_lever.is_some());
    }

    #[tokio::test]
    async fn dropping_the_guard_releases_the_key() {
        let registry = OperationRegistry::new();
        {
            let guard = registry.start("embeddings").await.unwrap();
            guard.release().await;
        }
        assert!(!registry.is_running("embeddings").await);
        let again = registry.start("embeddings").await;
        assert!(again.is_some());
    }

    #[test]
    fn crawl_key_distinguishes_all_from_family() {
        assert_eq!(crawl_key(None), "crawl_all");
        assert_eq!(crawl_key(Some(AtsFamily::Greenhouse)), "crawl_greenhouse");
    }
}
