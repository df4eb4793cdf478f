//! In-memory job store for testing and development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{DiscoveryError, Result};
use crate::traits::store::JobStore;
use crate::types::job::{JobError, SearchJob, SearchProgress, SearchStage};
use crate::types::metrics::AggregatedSearchResult;
use crate::types::result::SearchResult;

/// In-memory storage for jobs and aggregates.
///
/// Useful for testing and development. Not suitable for production as
/// data is lost on restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, SearchJob>>,
    aggregates: RwLock<HashMap<Uuid, AggregatedSearchResult>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    /// Stored aggregate for a job, if finished.
    pub fn aggregate(&self, search_id: Uuid) -> Option<AggregatedSearchResult> {
        self.aggregates.read().unwrap().get(&search_id).cloned()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.jobs.write().unwrap().clear();
        self.aggregates.write().unwrap().clear();
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save_job(&self, job: &SearchJob) -> Result<()> {
        self.jobs
            .write()
            .unwrap()
            .insert(job.search_id, job.clone());
        Ok(())
    }

    async fn load_job(&self, search_id: Uuid) -> Result<Option<SearchJob>> {
        Ok(self.jobs.read().unwrap().get(&search_id).cloned())
    }

    async fn update_stage(
        &self,
        search_id: Uuid,
        stage: SearchStage,
        progress: &SearchProgress,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs
            .get_mut(&search_id)
            .ok_or(DiscoveryError::JobNotFound { search_id })?;
        // Idempotent: writing the current stage again is a no-op.
        job.stage = stage;
        job.progress = progress.clone();
        Ok(())
    }

    async fn append_results(&self, search_id: Uuid, results: &[SearchResult]) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs
            .get_mut(&search_id)
            .ok_or(DiscoveryError::JobNotFound { search_id })?;
        for result in results {
            if !job.results.iter().any(|r| r.id == result.id) {
                job.results.push(result.clone());
            }
        }
        Ok(())
    }

    async fn record_error(&self, search_id: Uuid, error: &JobError) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs
            .get_mut(&search_id)
            .ok_or(DiscoveryError::JobNotFound { search_id })?;
        job.errors.push(error.clone());
        Ok(())
    }

    async fn save_aggregate(&self, aggregate: &AggregatedSearchResult) -> Result<()> {
        self.aggregates
            .write()
            .unwrap()
            .insert(aggregate.search_id, aggregate.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::SearchConfiguration;

    #[tokio::test]
    async fn test_roundtrip() {
        let store = MemoryJobStore::new();
        let job = SearchJob::new(SearchConfiguration::new("test"), None);
        let id = job.search_id;

        store.save_job(&job).await.unwrap();
        assert_eq!(store.job_count(), 1);

        let loaded = store.load_job(id).await.unwrap().unwrap();
        assert_eq!(loaded.search_id, id);
        assert!(store.load_job(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_stage_is_idempotent() {
        let store = MemoryJobStore::new();
        let mut job = SearchJob::new(SearchConfiguration::new("test"), None);
        store.save_job(&job).await.unwrap();

        job.transition_to(SearchStage::QueryGeneration).unwrap();
        store
            .update_stage(job.search_id, job.stage, &job.progress)
            .await
            .unwrap();
        // Replaying the same write succeeds and changes nothing further.
        store
            .update_stage(job.search_id, job.stage, &job.progress)
            .await
            .unwrap();

        let loaded = store.load_job(job.search_id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, SearchStage::QueryGeneration);
    }

    #[tokio::test]
    async fn test_append_results_skips_known_ids() {
        use crate::types::result::{SearchResult, SourceType};
        use url::Url;

        let store = MemoryJobStore::new();
        let job = SearchJob::new(SearchConfiguration::new("test"), None);
        store.save_job(&job).await.unwrap();

        let result = SearchResult::new(
            Url::parse("https://example.com").unwrap(),
            SourceType::ScrapeProvider,
        );
        store
            .append_results(job.search_id, &[result.clone()])
            .await
            .unwrap();
        store.append_results(job.search_id, &[result]).await.unwrap();

        let loaded = store.load_job(job.search_id).await.unwrap().unwrap();
        assert_eq!(loaded.results.len(), 1);
    }
}
