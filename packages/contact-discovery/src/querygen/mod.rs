//! Query generation: templates, optional AI enhancement, scoring, dedup.

pub mod scoring;
pub mod templates;

use std::collections::BTreeSet;
use std::time::Instant;

use crate::traits::provider::QueryEnhancer;
use crate::types::config::{QueryGenerationConfig, SearchConfiguration};
use crate::types::query::{GeneratedQuery, QueryScores, QueryType};
use templates::TemplateQuery;

/// Produces a ranked, deduplicated set of search queries for a job.
///
/// Generation never fails: AI-enhancement errors degrade to the
/// template-only set.
pub struct QueryGenerator {
    config: QueryGenerationConfig,
}

impl Default for QueryGenerator {
    fn default() -> Self {
        Self::new(QueryGenerationConfig::default())
    }
}

impl QueryGenerator {
    /// Create a generator with the given tuning.
    pub fn new(config: QueryGenerationConfig) -> Self {
        Self { config }
    }

    /// Generate scored queries for a search configuration.
    pub async fn generate(
        &self,
        search: &SearchConfiguration,
        enhancer: Option<&dyn QueryEnhancer>,
    ) -> Vec<GeneratedQuery> {
        let started = Instant::now();
        let mut candidates = templates::instantiate(search);

        if search.options.enable_ai_enhancement {
            if let Some(enhancer) = enhancer {
                self.enhance_candidates(search, enhancer, &mut candidates)
                    .await;
            }
        }

        let queries = self.select(search, candidates, started);
        tracing::debug!(
            count = queries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query generation finished"
        );
        queries
    }

    /// Ask the enhancer for paraphrases of the top template queries.
    /// Failures are logged and swallowed.
    async fn enhance_candidates(
        &self,
        search: &SearchConfiguration,
        enhancer: &dyn QueryEnhancer,
        candidates: &mut Vec<TemplateQuery>,
    ) {
        let seeds: Vec<TemplateQuery> = candidates
            .iter()
            .take(self.config.max_enhancement_candidates)
            .cloned()
            .collect();

        for seed in seeds {
            match enhancer.enhance(&seed.text, &search.criteria).await {
                Ok(variants) => {
                    for text in variants {
                        let text = text.trim().to_string();
                        if text.is_empty() {
                            continue;
                        }
                        candidates.push(TemplateQuery {
                            text,
                            template: "ai_enhanced",
                            priority: seed.priority,
                            query_type: QueryType::AiEnhanced,
                            dimensions: seed.dimensions.clone(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        query = %seed.text,
                        error = %e,
                        "AI enhancement failed, keeping template output"
                    );
                }
            }
        }
    }

    /// Score candidates, greedily select by overall score, and drop
    /// near-duplicates of already-selected queries.
    fn select(
        &self,
        search: &SearchConfiguration,
        candidates: Vec<TemplateQuery>,
        started: Instant,
    ) -> Vec<GeneratedQuery> {
        let requested = templates::requested_dimensions(&search.criteria);

        struct Scored {
            candidate: TemplateQuery,
            tokens: BTreeSet<String>,
            relevance: f32,
            coverage: f32,
        }

        let mut remaining: Vec<Scored> = candidates
            .into_iter()
            .map(|candidate| {
                let tokens = scoring::tokens(&candidate.text);
                let relevance = scoring::relevance(&tokens, search);
                let coverage = scoring::coverage(&candidate.dimensions, &requested);
                Scored {
                    candidate,
                    tokens,
                    relevance,
                    coverage,
                }
            })
            .collect();

        let mut selected: Vec<GeneratedQuery> = Vec::new();
        let mut selected_tokens: Vec<BTreeSet<String>> = Vec::new();

        while selected.len() < self.config.max_queries && !remaining.is_empty() {
            // Pick the best candidate under the current diversity context.
            let mut best_index = 0;
            let mut best_scores = QueryScores::default();
            for (index, scored) in remaining.iter().enumerate() {
                let diversity = scoring::diversity(&scored.tokens, &selected_tokens);
                let overall =
                    scoring::overall(scored.relevance, scored.coverage, diversity, &self.config);
                let scores = QueryScores {
                    relevance: scored.relevance,
                    diversity,
                    coverage: scored.coverage,
                    overall,
                };
                let better = index == 0
                    || overall > best_scores.overall
                    || (overall == best_scores.overall
                        && scored.candidate.priority
                            < remaining[best_index].candidate.priority);
                if better {
                    best_index = index;
                    best_scores = scores;
                }
            }

            let scored = remaining.swap_remove(best_index);

            // Near-duplicate of something already selected: discard. The
            // kept representative is the higher scorer since selection is
            // best-first.
            let is_duplicate = selected_tokens
                .iter()
                .any(|s| scoring::similarity(&scored.tokens, s) >= self.config.dedup_similarity_threshold);
            if is_duplicate {
                continue;
            }

            selected.push(GeneratedQuery {
                text: scored.candidate.text,
                query_type: scored.candidate.query_type,
                template: scored.candidate.template.to_string(),
                template_priority: scored.candidate.priority,
                scores: best_scores,
                enhanced: scored.candidate.query_type == QueryType::AiEnhanced,
                processing_time_ms: started.elapsed().as_millis() as u64,
            });
            selected_tokens.push(scored.tokens);
        }

        // Descending overall, ties broken by earlier template priority.
        selected.sort_by(|a, b| {
            b.scores
                .overall
                .partial_cmp(&a.scores.overall)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.template_priority.cmp(&b.template_priority))
        });
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{DiscoveryError, Result};
    use crate::types::config::{SearchCriteria, SearchOptions};

    struct FailingEnhancer;

    #[async_trait]
    impl QueryEnhancer for FailingEnhancer {
        async fn enhance(&self, _query: &str, _context: &SearchCriteria) -> Result<Vec<String>> {
            Err(DiscoveryError::Ai("model overloaded".into()))
        }
    }

    struct EchoEnhancer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryEnhancer for EchoEnhancer {
        async fn enhance(&self, query: &str, _context: &SearchCriteria) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("{query} newsroom directory")])
        }
    }

    fn config() -> SearchConfiguration {
        SearchConfiguration::new("renewable energy").with_criteria(
            SearchCriteria::new()
                .with_countries(["Germany"])
                .with_beats(["climate"]),
        )
    }

    #[tokio::test]
    async fn test_enhancement_failure_degrades_gracefully() {
        let generator = QueryGenerator::default();
        let queries = generator.generate(&config(), Some(&FailingEnhancer)).await;

        assert!(!queries.is_empty());
        assert!(queries.iter().all(|q| q.query_type != QueryType::AiEnhanced));
    }

    #[tokio::test]
    async fn test_enhancement_adds_variants() {
        let generator = QueryGenerator::default();
        let enhancer = EchoEnhancer {
            calls: AtomicUsize::new(0),
        };
        let queries = generator.generate(&config(), Some(&enhancer)).await;

        assert!(enhancer.calls.load(Ordering::SeqCst) > 0);
        assert!(queries.iter().any(|q| q.enhanced));
    }

    #[tokio::test]
    async fn test_enhancement_skipped_when_disabled() {
        let generator = QueryGenerator::default();
        let enhancer = EchoEnhancer {
            calls: AtomicUsize::new(0),
        };
        let mut search = config();
        search.options = SearchOptions::new().with_ai_enhancement(false);

        let _ = generator.generate(&search, Some(&enhancer)).await;
        assert_eq!(enhancer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_sorted_by_overall() {
        let generator = QueryGenerator::default();
        let queries = generator.generate(&config(), None).await;

        assert!(!queries.is_empty());
        for pair in queries.windows(2) {
            assert!(pair[0].scores.overall >= pair[1].scores.overall);
        }
    }

    #[tokio::test]
    async fn test_near_duplicates_removed() {
        struct DuplicatingEnhancer;

        #[async_trait]
        impl QueryEnhancer for DuplicatingEnhancer {
            async fn enhance(&self, query: &str, _: &SearchCriteria) -> Result<Vec<String>> {
                // Same token set as the seed, different casing/punctuation.
                Ok(vec![query.to_uppercase(), format!("{query}!")])
            }
        }

        let generator = QueryGenerator::default();
        let queries = generator
            .generate(&config(), Some(&DuplicatingEnhancer))
            .await;

        let token_sets: Vec<_> = queries.iter().map(|q| scoring::tokens(&q.text)).collect();
        for (i, a) in token_sets.iter().enumerate() {
            for b in &token_sets[i + 1..] {
                assert!(
                    scoring::similarity(a, b) < 0.85,
                    "near-duplicate queries survived selection"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_coverage_reflected_in_queries() {
        let generator = QueryGenerator::default();
        let queries = generator.generate(&config(), None).await;

        let combo = queries
            .iter()
            .find(|q| q.template == "beat_country")
            .expect("combination template present");
        let base = queries
            .iter()
            .find(|q| q.template == "base_contact")
            .expect("base template present");
        assert!(combo.scores.coverage > base.scores.coverage);
    }

    #[tokio::test]
    async fn test_max_queries_respected() {
        let generator = QueryGenerator::new(QueryGenerationConfig::new().with_max_queries(2));
        let queries = generator.generate(&config(), None).await;
        assert!(queries.len() <= 2);
    }
}
