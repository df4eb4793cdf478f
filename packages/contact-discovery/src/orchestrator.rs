//! The search orchestrator: drives one job through the stage pipeline.
//!
//! Stages run in a fixed sequence; work inside a stage fans out under the
//! configured concurrency bounds and merges deterministically before the
//! next stage reads it. Per-source failures are recorded on the job and
//! never abort it; a job fails only when nothing usable was gathered or a
//! timeout fires. Cancellation is cooperative through a token threaded
//! into every suspension point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dedup::{DedupOutcome, Deduplicator};
use crate::error::{DiscoveryError, Result};
use crate::extract::ContactExtractor;
use crate::querygen::QueryGenerator;
use crate::retry::{RetryFailure, Retryer};
use crate::robots;
use crate::throttle::DomainThrottle;
use crate::traits::provider::{
    ContactParser, ContentFetcher, FetchedPage, QueryEnhancer, SearchProvider,
    SearchProviderOptions, SourceHit,
};
use crate::traits::store::JobStore;
use crate::types::config::{OrchestratorConfig, SearchConfiguration};
use crate::types::contact::ExtractedContact;
use crate::types::job::{JobError, SearchJob, SearchStage};
use crate::types::metrics::{AggregatedSearchResult, SearchMetrics};
use crate::types::query::GeneratedQuery;
use crate::types::result::{authority_score, content_hash, SearchResult, SourceType};

/// A scraped page waiting for extraction.
struct ScrapedPage {
    result: SearchResult,
    content: String,
}

/// Drives search jobs end to end.
///
/// One orchestrator serves many jobs; the injected [`DomainThrottle`] is
/// the only state shared between them.
pub struct SearchOrchestrator<P, F, S> {
    provider: P,
    fetcher: F,
    store: S,
    throttle: Arc<DomainThrottle>,
    config: OrchestratorConfig,
    enhancer: Option<Arc<dyn QueryEnhancer>>,
    parser: Option<Arc<dyn ContactParser>>,
    active: Mutex<HashMap<Uuid, CancellationToken>>,
    search_slots: tokio::sync::Semaphore,
}

impl<P, F, S> SearchOrchestrator<P, F, S>
where
    P: SearchProvider,
    F: ContentFetcher,
    S: JobStore,
{
    /// Create an orchestrator.
    pub fn new(
        provider: P,
        fetcher: F,
        store: S,
        throttle: Arc<DomainThrottle>,
        config: OrchestratorConfig,
    ) -> Self {
        let search_slots = tokio::sync::Semaphore::new(config.max_concurrent_searches.max(1));
        Self {
            provider,
            fetcher,
            store,
            throttle,
            config,
            enhancer: None,
            parser: None,
            active: Mutex::new(HashMap::new()),
            search_slots,
        }
    }

    /// Attach the AI query-enhancement collaborator.
    pub fn with_enhancer(mut self, enhancer: Arc<dyn QueryEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Attach the AI contact-parsing collaborator.
    pub fn with_parser(mut self, parser: Arc<dyn ContactParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Identifiers of jobs currently running on this orchestrator.
    pub fn active_searches(&self) -> Vec<Uuid> {
        self.active.lock().unwrap().keys().copied().collect()
    }

    /// Request cancellation of a running job.
    ///
    /// Returns false if the job is not currently active. New work stops
    /// promptly; in-flight operations are interrupted at their next
    /// suspension point and already-collected results are preserved.
    pub fn cancel(&self, search_id: Uuid, reason: &str) -> bool {
        let active = self.active.lock().unwrap();
        match active.get(&search_id) {
            Some(token) => {
                info!(search_id = %search_id, reason = %reason, "cancelling search job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one search job to a terminal state.
    ///
    /// Always returns an aggregate for valid configurations: completed,
    /// failed, and cancelled jobs all report their partial results,
    /// accumulated errors, and metrics.
    pub async fn run(
        &self,
        configuration: SearchConfiguration,
        user_id: Option<String>,
    ) -> Result<AggregatedSearchResult> {
        configuration
            .validate()
            .map_err(|reason| DiscoveryError::InvalidConfig { reason })?;

        let _slot = self
            .search_slots
            .acquire()
            .await
            .map_err(|_| DiscoveryError::Cancelled)?;

        let mut job = SearchJob::new(configuration, user_id);
        let token = CancellationToken::new();
        self.active
            .lock()
            .unwrap()
            .insert(job.search_id, token.clone());
        self.store.save_job(&job).await?;

        info!(
            search_id = %job.search_id,
            query = %job.configuration.query,
            "search job starting"
        );

        let total_timeout = job
            .configuration
            .options
            .timeout
            .unwrap_or(self.config.timeouts.total_search);
        let started = Instant::now();
        let mut metrics = SearchMetrics::default();

        let driven =
            tokio::time::timeout(total_timeout, self.drive(&mut job, &token, &mut metrics)).await;

        let dedup = match driven {
            Ok(Ok(dedup)) => {
                self.finish(&mut job, SearchStage::Completed);
                dedup
            }
            Ok(Err(DiscoveryError::Cancelled)) => {
                self.finish(&mut job, SearchStage::Cancelled);
                self.partial_dedup(&job, &mut metrics)
            }
            Ok(Err(e)) => {
                let error = JobError::new(job.stage, e.category(), e.to_string());
                let _ = self.store.record_error(job.search_id, &error).await;
                job.record_error(error);
                self.finish(&mut job, SearchStage::Failed);
                self.partial_dedup(&job, &mut metrics)
            }
            Err(_elapsed) => {
                let timeout_error = DiscoveryError::TotalTimeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                let error = JobError::new(
                    job.stage,
                    timeout_error.category(),
                    timeout_error.to_string(),
                );
                let _ = self.store.record_error(job.search_id, &error).await;
                job.record_error(error);
                self.finish(&mut job, SearchStage::Failed);
                self.partial_dedup(&job, &mut metrics)
            }
        };

        metrics.performance.total_ms = started.elapsed().as_millis() as u64;
        let aggregate = build_aggregate(&job, dedup, metrics);

        if let Err(e) = self.store.save_job(&job).await {
            warn!(search_id = %job.search_id, error = %e, "failed to persist final job state");
        }
        if let Err(e) = self.store.save_aggregate(&aggregate).await {
            warn!(search_id = %job.search_id, error = %e, "failed to persist aggregate");
        }
        self.active.lock().unwrap().remove(&job.search_id);

        info!(
            search_id = %job.search_id,
            stage = ?job.stage,
            results = aggregate.total_results,
            unique_contacts = aggregate.unique_contacts,
            errors = aggregate.errors.len(),
            "search job finished"
        );
        Ok(aggregate)
    }

    /// Run the pipeline stages. Returns the dedup outcome on full success;
    /// any error is mapped to a terminal state by the caller.
    async fn drive(
        &self,
        job: &mut SearchJob,
        token: &CancellationToken,
        metrics: &mut SearchMetrics,
    ) -> Result<DedupOutcome> {
        let timeouts = self.config.timeouts.clone();

        // Query generation.
        ensure_live(token)?;
        job.transition_to(SearchStage::QueryGeneration)?;
        self.persist_stage(job).await;
        let stage_started = Instant::now();
        let generator = QueryGenerator::new(self.config.query_generation.clone());
        let queries = tokio::time::timeout(
            timeouts.query_generation,
            generator.generate(&job.configuration, self.enhancer.as_deref()),
        )
        .await
        .map_err(|_| DiscoveryError::StageTimeout {
            stage: SearchStage::QueryGeneration,
        })?;
        metrics.query.generated = queries.len();
        metrics.query.enhanced = queries.iter().filter(|q| q.enhanced).count();
        metrics.performance.query_generation_ms = stage_started.elapsed().as_millis() as u64;
        if queries.is_empty() {
            return Err(DiscoveryError::NoUsableResults {
                reason: "no queries could be generated".to_string(),
            });
        }
        job.progress.advance_stage(SearchStage::QueryGeneration, 1, 1);

        // Web search.
        ensure_live(token)?;
        job.transition_to(SearchStage::WebSearch)?;
        self.persist_stage(job).await;
        let stage_started = Instant::now();
        let hits = tokio::time::timeout(
            timeouts.web_search,
            self.search_stage(job, &queries, token, metrics),
        )
        .await
        .map_err(|_| DiscoveryError::StageTimeout {
            stage: SearchStage::WebSearch,
        })??;
        metrics.performance.web_search_ms = stage_started.elapsed().as_millis() as u64;

        if hits.is_empty() && metrics.query.failed > 0 {
            return Err(DiscoveryError::NoUsableResults {
                reason: format!("all {} queries failed", metrics.query.failed),
            });
        }

        // Content scraping.
        ensure_live(token)?;
        job.transition_to(SearchStage::ContentScraping)?;
        self.persist_stage(job).await;
        let stage_started = Instant::now();
        let pages = tokio::time::timeout(
            timeouts.content_scraping,
            self.scrape_stage(job, hits, token, metrics),
        )
        .await
        .map_err(|_| DiscoveryError::StageTimeout {
            stage: SearchStage::ContentScraping,
        })??;
        metrics.performance.content_scraping_ms = stage_started.elapsed().as_millis() as u64;

        if pages.is_empty() && metrics.source.fetch_failures > 0 {
            return Err(DiscoveryError::NoUsableResults {
                reason: format!("all {} fetches failed", metrics.source.fetch_failures),
            });
        }

        // Contact extraction.
        ensure_live(token)?;
        job.transition_to(SearchStage::ContactExtraction)?;
        self.persist_stage(job).await;
        let stage_started = Instant::now();
        tokio::time::timeout(
            timeouts.contact_extraction,
            self.extraction_stage(job, pages, token, metrics),
        )
        .await
        .map_err(|_| DiscoveryError::StageTimeout {
            stage: SearchStage::ContactExtraction,
        })??;
        metrics.performance.contact_extraction_ms = stage_started.elapsed().as_millis() as u64;

        // Result aggregation.
        ensure_live(token)?;
        job.transition_to(SearchStage::ResultAggregation)?;
        self.persist_stage(job).await;
        let stage_started = Instant::now();
        let contacts: Vec<ExtractedContact> = job
            .results
            .iter()
            .flat_map(|r| r.contacts.iter().cloned())
            .collect();
        let dedup = Deduplicator::new(self.config.dedup.clone()).deduplicate(&contacts);
        metrics.contact.unique = dedup.unique_contacts.len();
        metrics.contact.duplicates = dedup.duplicate_count;
        metrics.performance.result_aggregation_ms = stage_started.elapsed().as_millis() as u64;
        job.progress.advance_stage(SearchStage::ResultAggregation, 1, 1);

        // Finalization (the aggregate itself is assembled by the caller
        // so failed/cancelled paths share the same code).
        ensure_live(token)?;
        job.transition_to(SearchStage::Finalization)?;
        self.persist_stage(job).await;

        Ok(dedup)
    }

    /// Dispatch queries in bounded chunks and merge hits deterministically.
    async fn search_stage(
        &self,
        job: &mut SearchJob,
        queries: &[GeneratedQuery],
        token: &CancellationToken,
        metrics: &mut SearchMetrics,
    ) -> Result<Vec<SourceHit>> {
        let options = SearchProviderOptions {
            max_results: self.config.results_per_query,
            include_domains: job.configuration.criteria.domains.clone(),
        };
        let retryer =
            Retryer::new(self.config.retry.clone()).with_cancellation(token.clone());

        let total = queries.len();
        let mut done = 0;
        let mut merged: Vec<SourceHit> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for chunk in queries.chunks(self.config.max_concurrent_queries.max(1)) {
            ensure_live(token)?;

            let futures = chunk.iter().map(|query| {
                let retryer = &retryer;
                let options = &options;
                async move {
                    let outcome = retryer
                        .execute_with(
                            || self.provider.search(&query.text, options),
                            |e| e.is_retryable(),
                        )
                        .await;
                    (query, outcome)
                }
            });

            for (query, outcome) in join_all(futures).await {
                match outcome.result {
                    Ok(hits) => {
                        metrics.query.dispatched += 1;
                        for hit in hits {
                            if seen.insert(hit.url.to_string()) {
                                merged.push(hit);
                            }
                        }
                    }
                    Err(RetryFailure::Cancelled) => return Err(DiscoveryError::Cancelled),
                    Err(RetryFailure::Operation(e)) => {
                        metrics.query.failed += 1;
                        let error = JobError::new(
                            SearchStage::WebSearch,
                            e.category(),
                            format!("query '{}' failed: {e}", query.text),
                        );
                        let _ = self.store.record_error(job.search_id, &error).await;
                        job.record_error(error);
                    }
                }
            }

            done += chunk.len();
            job.progress.advance_stage(SearchStage::WebSearch, done, total);
            self.persist_stage(job).await;
        }

        // Completion order must not leak into downstream ordering.
        merged.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.url.as_str().cmp(b.url.as_str()))
        });
        merged.truncate(job.configuration.options.max_results);
        metrics.source.urls_discovered = merged.len();
        Ok(merged)
    }

    /// Fetch pages through the throttle, honoring robots.txt crawl-delay,
    /// skipping content already seen this job.
    async fn scrape_stage(
        &self,
        job: &mut SearchJob,
        hits: Vec<SourceHit>,
        token: &CancellationToken,
        metrics: &mut SearchMetrics,
    ) -> Result<Vec<ScrapedPage>> {
        let retryer =
            Retryer::new(self.config.retry.clone()).with_cancellation(token.clone());
        let respect_crawl_delay = self.config.throttle.respect_crawl_delay;

        let total = hits.len();
        let mut done = 0;
        let mut pages: Vec<ScrapedPage> = Vec::new();
        let mut seen_hashes: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut crawl_delays: HashMap<String, Option<Duration>> = HashMap::new();

        let mut remaining = hits;
        while !remaining.is_empty() {
            ensure_live(token)?;
            let take = self.config.max_concurrent_fetches.max(1).min(remaining.len());
            let chunk: Vec<SourceHit> = remaining.drain(..take).collect();

            // Resolve crawl-delays domain by domain, once.
            if respect_crawl_delay {
                for hit in &chunk {
                    let domain = hit.url.host_str().unwrap_or_default().to_string();
                    if !crawl_delays.contains_key(&domain) {
                        let rules = robots::fetch_robots(&self.fetcher, &hit.url).await;
                        crawl_delays.insert(domain, rules.crawl_delay("ContactDiscoveryBot"));
                    }
                }
            }

            let futures = chunk.iter().map(|hit| {
                let retryer = &retryer;
                let crawl_delay = crawl_delays
                    .get(hit.url.host_str().unwrap_or_default())
                    .copied()
                    .flatten();
                async move {
                    let url = hit.url.to_string();
                    let outcome = retryer
                        .execute_with(
                            || {
                                self.throttle.execute(&url, crawl_delay, Some(token), || {
                                    self.fetcher.fetch(&hit.url)
                                })
                            },
                            |e: &DiscoveryError| e.retryable(),
                        )
                        .await;
                    (hit, outcome)
                }
            });

            for (hit, outcome) in join_all(futures).await {
                match outcome.result {
                    Ok(page) => {
                        metrics.source.pages_fetched += 1;
                        let hash = content_hash(&page.content);
                        if !seen_hashes.insert(hash) {
                            metrics.source.duplicate_content_skipped += 1;
                            continue;
                        }
                        pages.push(scraped_from_page(hit, page));
                    }
                    Err(RetryFailure::Cancelled) => return Err(DiscoveryError::Cancelled),
                    Err(RetryFailure::Operation(DiscoveryError::Cancelled)) => {
                        return Err(DiscoveryError::Cancelled)
                    }
                    Err(RetryFailure::Operation(e)) => {
                        metrics.source.fetch_failures += 1;
                        let error =
                            JobError::new(SearchStage::ContentScraping, e.category(), e.to_string())
                                .with_url(hit.url.to_string());
                        let _ = self.store.record_error(job.search_id, &error).await;
                        job.record_error(error);

                        // A search-provider snippet still makes a usable
                        // (thin) source when the full fetch failed.
                        if let Some(scraped) = scraped_from_snippet(hit) {
                            pages.push(scraped);
                        }
                    }
                }
            }

            done += take;
            job.progress
                .advance_stage(SearchStage::ContentScraping, done, total);
            self.persist_stage(job).await;
        }

        // Deterministic order for the extraction stage.
        pages.sort_by(|a, b| {
            b.result
                .relevance_score
                .partial_cmp(&a.result.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.result.url.as_str().cmp(b.result.url.as_str()))
        });
        Ok(pages)
    }

    /// Extract contacts from scraped pages in bounded chunks, appending
    /// finished results to the job as each chunk completes.
    async fn extraction_stage(
        &self,
        job: &mut SearchJob,
        pages: Vec<ScrapedPage>,
        token: &CancellationToken,
        metrics: &mut SearchMetrics,
    ) -> Result<()> {
        let extractor = ContactExtractor::new(self.config.extraction.clone());
        let criteria = job.configuration.criteria.clone();
        let threshold = job.configuration.options.confidence_threshold;
        let parser = self.parser.as_deref();

        let total = pages.len();
        let mut done = 0;
        let mut remaining = pages;

        while !remaining.is_empty() {
            ensure_live(token)?;
            let take = self
                .config
                .max_concurrent_extractions
                .max(1)
                .min(remaining.len());
            let chunk: Vec<ScrapedPage> = remaining.drain(..take).collect();

            let futures = chunk.into_iter().map(|scraped| {
                let extractor = &extractor;
                let criteria = &criteria;
                async move {
                    let page = FetchedPage {
                        url: scraped.result.url.clone(),
                        content: scraped.content,
                        title: scraped.result.title.clone(),
                        status: 200,
                        metadata: HashMap::new(),
                        fetched_at: chrono::Utc::now(),
                    };
                    tokio::select! {
                        _ = token.cancelled() => None,
                        outcome = extractor.extract(&page, criteria, threshold, parser) => {
                            Some((scraped.result, outcome))
                        }
                    }
                }
            });

            let mut completed: Vec<SearchResult> = Vec::new();
            for item in join_all(futures).await.into_iter().flatten() {
                let (mut result, outcome) = item;
                metrics.contact.extracted += outcome.contacts.len();
                metrics.contact.below_threshold += outcome.below_threshold;

                if let Some(failure) = outcome.failure {
                    result
                        .metadata
                        .insert("extraction_failure".to_string(), failure.clone());
                    let error =
                        JobError::new(SearchStage::ContactExtraction, crate::error::ErrorCategory::Application, failure)
                            .with_url(result.url.to_string());
                    let _ = self.store.record_error(job.search_id, &error).await;
                    job.record_error(error);
                }

                result.contacts = outcome.contacts;
                result.refresh_confidence();
                completed.push(result);
            }

            if let Err(e) = self.store.append_results(job.search_id, &completed).await {
                warn!(search_id = %job.search_id, error = %e, "failed to persist results");
            }
            job.push_results(completed);

            done += take;
            job.progress
                .advance_stage(SearchStage::ContactExtraction, done, total);
            self.persist_stage(job).await;
        }

        if token.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        Ok(())
    }

    /// Transition to a terminal stage, tolerating the no-op case.
    fn finish(&self, job: &mut SearchJob, stage: SearchStage) {
        if let Err(e) = job.transition_to(stage) {
            warn!(search_id = %job.search_id, error = %e, "terminal transition rejected");
        }
    }

    /// Dedup whatever the job gathered, for failed/cancelled aggregates.
    fn partial_dedup(&self, job: &SearchJob, metrics: &mut SearchMetrics) -> DedupOutcome {
        let contacts: Vec<ExtractedContact> = job
            .results
            .iter()
            .flat_map(|r| r.contacts.iter().cloned())
            .collect();
        let dedup = Deduplicator::new(self.config.dedup.clone()).deduplicate(&contacts);
        metrics.contact.unique = dedup.unique_contacts.len();
        metrics.contact.duplicates = dedup.duplicate_count;
        dedup
    }

    async fn persist_stage(&self, job: &SearchJob) {
        if let Err(e) = self
            .store
            .update_stage(job.search_id, job.stage, &job.progress)
            .await
        {
            warn!(search_id = %job.search_id, error = %e, "failed to persist stage update");
        }
    }
}

fn ensure_live(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(DiscoveryError::Cancelled)
    } else {
        Ok(())
    }
}

fn scraped_from_page(hit: &SourceHit, page: FetchedPage) -> ScrapedPage {
    let mut result = SearchResult::new(hit.url.clone(), SourceType::ScrapeProvider);
    result.title = page.title.clone().or_else(|| hit.title.clone());
    result.authority_score = authority_score(&hit.url, None);
    result.relevance_score = hit.score.unwrap_or(0.5);
    result.metadata = page.metadata.clone();
    result.set_content(&page.content);
    ScrapedPage {
        result,
        content: page.content,
    }
}

/// Thin result built from a search snippet when the full fetch failed.
fn scraped_from_snippet(hit: &SourceHit) -> Option<ScrapedPage> {
    let snippet = hit.snippet.clone()?;
    if snippet.trim().is_empty() {
        return None;
    }
    let mut result = SearchResult::new(hit.url.clone(), SourceType::SearchProvider);
    result.title = hit.title.clone();
    result.authority_score = authority_score(&hit.url, None);
    result.relevance_score = hit.score.unwrap_or(0.5);
    result.set_content(&snippet);
    Some(ScrapedPage {
        result,
        content: snippet,
    })
}

fn build_aggregate(
    job: &SearchJob,
    dedup: DedupOutcome,
    metrics: SearchMetrics,
) -> AggregatedSearchResult {
    let unique = &dedup.unique_contacts;
    let (average_confidence, average_quality) = if unique.is_empty() {
        (0.0, 0.0)
    } else {
        let confidence: f32 = unique.iter().map(|c| c.confidence_score).sum();
        let quality: f32 = unique.iter().map(|c| c.quality_score).sum();
        (
            confidence / unique.len() as f32,
            quality / unique.len() as f32,
        )
    };

    AggregatedSearchResult {
        search_id: job.search_id,
        stage: job.stage,
        total_results: job.results.len(),
        unique_contacts: unique.len(),
        duplicate_contacts: dedup.duplicate_count,
        average_confidence,
        average_quality,
        contacts: dedup.unique_contacts,
        duplicate_groups: dedup.groups,
        errors: job.errors.clone(),
        metrics,
    }
}
