//! Job metrics and the final aggregated result.
//!
//! Metrics accumulate throughout a job so that cancelled or failed jobs
//! still report whatever partial numbers they reached.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::contact::ExtractedContact;
use crate::types::dedup::DuplicateGroup;
use crate::types::job::{JobError, SearchStage};

/// Query-stage counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub generated: usize,
    pub enhanced: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Source-stage counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub urls_discovered: usize,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub duplicate_content_skipped: usize,
}

/// Contact-stage counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactMetrics {
    pub extracted: usize,
    pub below_threshold: usize,
    pub unique: usize,
    pub duplicates: usize,
}

/// Per-stage wall-clock timings in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub query_generation_ms: u64,
    pub web_search_ms: u64,
    pub content_scraping_ms: u64,
    pub contact_extraction_ms: u64,
    pub result_aggregation_ms: u64,
    pub total_ms: u64,
}

/// Full metrics breakdown for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMetrics {
    pub query: QueryMetrics,
    pub source: SourceMetrics,
    pub contact: ContactMetrics,
    pub performance: PerformanceMetrics,
}

/// Final (or partial, for cancelled/failed jobs) outcome of a search.
///
/// Callers can distinguish "zero results, no errors" from "zero results,
/// N source failures" by inspecting `errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSearchResult {
    pub search_id: Uuid,

    /// Terminal stage the job reached.
    pub stage: SearchStage,

    pub total_results: usize,

    /// Post-deduplication contact count.
    pub unique_contacts: usize,

    /// Redundant members across all duplicate groups.
    pub duplicate_contacts: usize,

    pub average_confidence: f32,
    pub average_quality: f32,

    /// One contact per real-world person: group representatives plus
    /// contacts that matched no group.
    pub contacts: Vec<ExtractedContact>,

    pub duplicate_groups: Vec<DuplicateGroup>,

    pub errors: Vec<JobError>,

    pub metrics: SearchMetrics,
}
