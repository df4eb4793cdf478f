//! Persistence seam for search jobs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::job::{JobError, SearchJob, SearchProgress, SearchStage};
use crate::types::metrics::AggregatedSearchResult;
use crate::types::result::SearchResult;

/// Persistence operations the orchestrator needs.
///
/// Stage/progress updates must be idempotent: re-writing the same
/// transition is a no-op, not an error, so a crashed orchestrator can
/// safely replay its last write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a full job snapshot (create or overwrite).
    async fn save_job(&self, job: &SearchJob) -> Result<()>;

    /// Load a job by id.
    async fn load_job(&self, search_id: Uuid) -> Result<Option<SearchJob>>;

    /// Record a stage transition and current progress.
    async fn update_stage(
        &self,
        search_id: Uuid,
        stage: SearchStage,
        progress: &SearchProgress,
    ) -> Result<()>;

    /// Append newly gathered results to a job.
    async fn append_results(&self, search_id: Uuid, results: &[SearchResult]) -> Result<()>;

    /// Record a non-fatal error against a job.
    async fn record_error(&self, search_id: Uuid, error: &JobError) -> Result<()>;

    /// Persist the final (or partial) aggregate for a job.
    async fn save_aggregate(&self, aggregate: &AggregatedSearchResult) -> Result<()>;
}
