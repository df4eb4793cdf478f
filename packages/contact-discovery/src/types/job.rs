//! Search job state and progress tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DiscoveryError, ErrorCategory};
use crate::types::config::SearchConfiguration;
use crate::types::result::SearchResult;

/// Pipeline stage of a search job.
///
/// Transitions are monotonic in the order declared here; the three
/// terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    Initializing,
    QueryGeneration,
    WebSearch,
    ContentScraping,
    ContactExtraction,
    ResultAggregation,
    Finalization,
    Completed,
    Failed,
    Cancelled,
}

impl SearchStage {
    /// Whether this stage admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchStage::Completed | SearchStage::Failed | SearchStage::Cancelled
        )
    }

    /// Baseline overall percentage when this stage begins.
    pub fn base_percentage(&self) -> f32 {
        match self {
            SearchStage::Initializing => 0.0,
            SearchStage::QueryGeneration => 10.0,
            SearchStage::WebSearch => 30.0,
            SearchStage::ContentScraping => 55.0,
            SearchStage::ContactExtraction => 75.0,
            SearchStage::ResultAggregation => 90.0,
            SearchStage::Finalization => 95.0,
            SearchStage::Completed | SearchStage::Failed | SearchStage::Cancelled => 100.0,
        }
    }

    /// Whether the state machine permits `self -> next`.
    ///
    /// Forward moves through the pipeline are allowed (stages may be
    /// skipped on failure paths); terminal states absorb everything.
    pub fn can_transition_to(&self, next: SearchStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next > *self
    }
}

/// Monotonic progress of a job.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchProgress {
    /// Overall completion, 0–100. Never decreases within a job.
    pub percentage: f32,

    /// Completion of the current stage, 0–100.
    pub stage_percentage: f32,

    pub completed_queries: usize,
    pub total_queries: usize,

    pub fetched_pages: usize,
    pub total_pages: usize,

    pub extracted_pages: usize,
}

impl SearchProgress {
    /// Raise the overall percentage; lower values are ignored.
    pub fn advance(&mut self, percentage: f32) {
        self.percentage = self.percentage.max(percentage.min(100.0));
    }

    /// Set sub-progress within the current stage and fold it into the
    /// overall percentage between `stage` and the next stage boundary.
    pub fn advance_stage(&mut self, stage: SearchStage, done: usize, total: usize) {
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f32 / total as f32).min(1.0)
        };
        self.stage_percentage = (fraction * 100.0).max(self.stage_percentage);

        let base = stage.base_percentage();
        let span = next_stage_base(stage) - base;
        self.advance(base + span * fraction);
    }
}

fn next_stage_base(stage: SearchStage) -> f32 {
    match stage {
        SearchStage::Initializing => SearchStage::QueryGeneration.base_percentage(),
        SearchStage::QueryGeneration => SearchStage::WebSearch.base_percentage(),
        SearchStage::WebSearch => SearchStage::ContentScraping.base_percentage(),
        SearchStage::ContentScraping => SearchStage::ContactExtraction.base_percentage(),
        SearchStage::ContactExtraction => SearchStage::ResultAggregation.base_percentage(),
        SearchStage::ResultAggregation => SearchStage::Finalization.base_percentage(),
        _ => 100.0,
    }
}

/// An error recorded against a job without aborting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub stage: SearchStage,
    pub category: ErrorCategory,
    pub message: String,
    pub url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl JobError {
    /// Record an error at a stage.
    pub fn new(stage: SearchStage, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            stage,
            category,
            message: message.into(),
            url: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attach the URL the error relates to.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A running or finished search job.
///
/// Owned exclusively by the orchestrator; stage changes go through
/// [`SearchJob::transition_to`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJob {
    pub search_id: Uuid,
    pub user_id: Option<String>,

    pub configuration: SearchConfiguration,

    pub stage: SearchStage,
    pub progress: SearchProgress,

    /// Append-only source results.
    pub results: Vec<SearchResult>,

    /// Non-fatal errors accumulated along the way.
    pub errors: Vec<JobError>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SearchJob {
    /// Create a job in the `Initializing` stage.
    pub fn new(configuration: SearchConfiguration, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            search_id: Uuid::new_v4(),
            user_id,
            configuration,
            stage: SearchStage::Initializing,
            progress: SearchProgress::default(),
            results: Vec::new(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Move to the next stage, enforcing monotonicity and absorbing
    /// terminal states.
    pub fn transition_to(&mut self, next: SearchStage) -> crate::error::Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(DiscoveryError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        tracing::info!(
            search_id = %self.search_id,
            from = ?self.stage,
            to = ?next,
            "stage transition"
        );
        self.stage = next;
        self.progress.advance(next.base_percentage());
        self.progress.stage_percentage = 0.0;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.progress.advance(100.0);
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Record a non-fatal error.
    pub fn record_error(&mut self, error: JobError) {
        tracing::warn!(
            search_id = %self.search_id,
            stage = ?error.stage,
            category = ?error.category,
            url = ?error.url,
            "job error: {}",
            error.message
        );
        self.errors.push(error);
        self.updated_at = Utc::now();
    }

    /// Append results (append-only; existing entries are never replaced).
    pub fn push_results(&mut self, results: impl IntoIterator<Item = SearchResult>) {
        self.results.extend(results);
        self.updated_at = Utc::now();
    }

    /// Whether the job has reached a terminal stage.
    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SearchJob {
        SearchJob::new(SearchConfiguration::new("climate reporters"), None)
    }

    #[test]
    fn test_stage_order_is_monotonic() {
        let mut job = job();
        assert!(job.transition_to(SearchStage::QueryGeneration).is_ok());
        assert!(job.transition_to(SearchStage::WebSearch).is_ok());
        // Backward transitions are rejected.
        assert!(job.transition_to(SearchStage::QueryGeneration).is_err());
        // Repeating the current stage is rejected.
        assert!(job.transition_to(SearchStage::WebSearch).is_err());
    }

    #[test]
    fn test_terminal_states_absorb() {
        let mut job = job();
        job.transition_to(SearchStage::QueryGeneration).unwrap();
        job.transition_to(SearchStage::Cancelled).unwrap();
        assert!(job.is_finished());
        assert!(job.transition_to(SearchStage::WebSearch).is_err());
        assert!(job.transition_to(SearchStage::Completed).is_err());
        assert_eq!(job.progress.percentage, 100.0);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_cancel_reachable_from_any_live_stage() {
        for stage in [
            SearchStage::Initializing,
            SearchStage::QueryGeneration,
            SearchStage::ContentScraping,
            SearchStage::Finalization,
        ] {
            assert!(stage.can_transition_to(SearchStage::Cancelled), "{stage:?}");
        }
        assert!(!SearchStage::Completed.can_transition_to(SearchStage::Cancelled));
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut progress = SearchProgress::default();
        progress.advance(40.0);
        progress.advance(20.0);
        assert_eq!(progress.percentage, 40.0);

        progress.advance_stage(SearchStage::WebSearch, 1, 4);
        let snapshot = progress.percentage;
        progress.advance_stage(SearchStage::WebSearch, 0, 4);
        assert!(progress.percentage >= snapshot);
    }

    #[test]
    fn test_stage_progress_folds_into_overall() {
        let mut progress = SearchProgress::default();
        progress.advance(SearchStage::WebSearch.base_percentage());
        progress.advance_stage(SearchStage::WebSearch, 2, 4);
        // Halfway between web_search (30) and content_scraping (55).
        assert!((progress.percentage - 42.5).abs() < 0.01);
    }
}
