//! Query scoring: relevance, coverage, diversity.
//!
//! The overall score is a weighted sum of the three sub-scores (weights in
//! [`crate::types::config::QueryGenerationConfig`]), so it is monotonic in
//! each sub-score.

use std::collections::BTreeSet;

use crate::querygen::templates::Dimension;
use crate::types::config::{QueryGenerationConfig, SearchConfiguration};

/// Lowercase alphanumeric token set of a text.
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Jaccard similarity of two token sets.
pub fn similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Match strength of a query against the stated criteria: the fraction of
/// the query's tokens that appear in the topic/criteria vocabulary.
pub fn relevance(query_tokens: &BTreeSet<String>, config: &SearchConfiguration) -> f32 {
    let mut vocabulary = tokens(&config.query);
    for term in config.criteria.terms() {
        vocabulary.extend(tokens(term));
    }
    for domain in &config.criteria.domains {
        vocabulary.extend(tokens(domain));
    }

    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens.intersection(&vocabulary).count();
    matched as f32 / query_tokens.len() as f32
}

/// Fraction of requested criterion dimensions the query represents.
///
/// 1.0 when no dimensions were requested. Adding a previously-unseen
/// dimension to `covered` can only grow the intersection, so coverage is
/// monotonic in the covered set.
pub fn coverage(covered: &[Dimension], requested: &[Dimension]) -> f32 {
    if requested.is_empty() {
        return 1.0;
    }
    let hit = requested.iter().filter(|d| covered.contains(d)).count();
    hit as f32 / requested.len() as f32
}

/// Dissimilarity from already-selected queries: the complement of the
/// highest token overlap with any of them. 1.0 for the first selection.
pub fn diversity(query_tokens: &BTreeSet<String>, selected: &[BTreeSet<String>]) -> f32 {
    let max_overlap = selected
        .iter()
        .map(|s| similarity(query_tokens, s))
        .fold(0.0f32, f32::max);
    1.0 - max_overlap
}

/// Weighted combination of the sub-scores.
pub fn overall(
    relevance: f32,
    coverage: f32,
    diversity: f32,
    config: &QueryGenerationConfig,
) -> f32 {
    config.relevance_weight * relevance
        + config.coverage_weight * coverage
        + config.diversity_weight * diversity
}
