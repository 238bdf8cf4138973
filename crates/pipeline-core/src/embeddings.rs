//! Batch embedding path. Picks up Jobs with null
//! embeddings, concatenates `title + family + skills`, calls the
//! embedding provider, writes 384-float vectors back.

use crate::error::EmbedError;
use crate::models::{Job, JobId};
use crate::storage::Storage;
use openai_client::OpenAIClient;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct EmbeddingEngine {
    client: Arc<OpenAIClient>,
    storage: Arc<dyn Storage>,
    model: String,
}

impl EmbeddingEngine {
    pub fn new(client: Arc<OpenAIClient>, storage: Arc<dyn Storage>, model: impl Into<String>) -> Self {
        Self { client, storage, model: model.into() }
    }

    /// The text handed to the embedding provider: `title + family +
    /// skills`, space-joined.
    fn embedding_input(job: &Job) -> String {
        let mut parts = vec![job.title.clone(), job.role_family.as_str().to_string()];
        parts.extend(job.skills.iter().cloned());
        parts.join(" ")
    }

    pub async fn embed_job(&self, job_id: JobId) -> Result<(), EmbedError> {
        let Some(job) = self.storage.get_job(job_id).await.map_err(EmbedError::Storage)? else {
            return Ok(());
        };
        let input = Self::embedding_input(&job);
        let vector = self
            .client
            .create_embedding(&input, &self.model)
            .await
            .map_err(|e| EmbedError::Provider(anyhow::Error::from(e)))?;
        self.storage.update_job_embedding(job.id, vector).await.map_err(EmbedError::Storage)?;
        Ok(())
    }

    /// Pulls up to `batch_size` Jobs missing an embedding and backfills
    /// them, bounded by `concurrency` (semaphore-bounded
    /// fan-out, mirroring the Crawl/Enrich engines' bulk path).
    pub async fn embed_missing(&self, batch_size: i64, concurrency: usize) -> Result<EmbeddingBatchStats, EmbedError> {
        let jobs = self.storage.jobs_missing_embedding(batch_size).await.map_err(EmbedError::Storage)?;
        let mut stats = EmbeddingBatchStats { attempted: jobs.len(), ..Default::default() };

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::new();
        for job in jobs {
            let client = self.client.clone();
            let storage = self.storage.clone();
            let model = self.model.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                embed_one(&client, &storage, &model, job).await
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(())) => stats.succeeded += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "embedding failed for job");
                    stats.failed += 1;
                }
                Err(_) => stats.failed += 1,
            }
            if (i + 1) % 10 == 0 {
                info!(succeeded = stats.succeeded, failed = stats.failed, "embedding batch progress");
            }
        }
        Ok(stats)
    }
}

async fn embed_one(
    client: &Arc<OpenAIClient>,
    storage: &Arc<dyn Storage>,
    model: &str,
    job: Job,
) -> Result<(), EmbedError> {
    let input = EmbeddingEngine::embedding_input(&job);
    let vector = client
        .create_embedding(&input, model)
        .await
        .map_err(|e| EmbedError::Provider(anyhow::Error::from(e)))?;
    storage.update_job_embedding(job.id, vector).await.map_err(EmbedError::Storage)?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatchStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Company, CompanyId, RoleFamily};

    #[test]
    fn embedding_input_joins_title_family_and_skills() {
        let mut job = sample_job();
        job.title = "Senior Backend Engineer".to_string();
        job.role_family = RoleFamily::Engineering;
        job.skills = vec!["rust".to_string(), "postgres".to_string()];
        let input = EmbeddingEngine::embedding_input(&job);
        assert_eq!(input, "Senior Backend Engineer engineering rust postgres");
    }

    fn sample_job() -> Job {
        Job {
            id: JobId::new(),
            company_id: CompanyId::new(),
            raw_job_id: None,
            title: String::new(),
            description: None,
            source_url: "https://acme.com/jobs/1".to_string(),
            role_family: RoleFamily::Other,
            role_specialization: None,
            seniority: None,
            location_type: None,
            locations: Vec::new(),
            skills: Vec::new(),
            min_salary: None,
            max_salary: None,
            employment_type: None,
            posted_at: None,
            freshness_score: None,
            embedding: None,
            is_active: true,
            last_verified_at: None,
            delisted_at: None,
            delist_reason: None,
            enrich_failed_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[allow(dead_code)]
    fn unused_company_ref() -> Company {
        Company::new("placeholder")
    }
}
