//! Generated search queries and their scores.

use serde::{Deserialize, Serialize};

/// Origin of a generated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Straight template instantiation over a single criterion dimension.
    Base,
    /// Paraphrase/expansion from the AI collaborator.
    AiEnhanced,
    /// Combination template crossing multiple dimensions.
    Variant,
}

/// Sub-scores assigned to a generated query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryScores {
    /// Match strength against the stated criteria.
    pub relevance: f32,

    /// Dissimilarity from already-selected queries.
    pub diversity: f32,

    /// Fraction of requested criteria dimensions represented.
    pub coverage: f32,

    /// Weighted combination of the sub-scores.
    pub overall: f32,
}

/// A scored, ready-to-dispatch search query.
///
/// Created by the query generator; read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub text: String,

    pub query_type: QueryType,

    /// Name of the template that produced this query.
    pub template: String,

    /// Template priority (lower dispatches first on score ties).
    pub template_priority: usize,

    pub scores: QueryScores,

    /// Whether AI enhancement touched this query.
    pub enhanced: bool,

    /// Wall-clock time spent producing this query, in milliseconds.
    pub processing_time_ms: u64,
}
