//! Configuration types for search jobs and pipeline components.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority of a search job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

/// Filter criteria scoping a contact search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Target countries (e.g., "Germany", "Kenya").
    #[serde(default)]
    pub countries: Vec<String>,

    /// Outlet categories (e.g., "newspaper", "broadcast", "trade press").
    #[serde(default)]
    pub categories: Vec<String>,

    /// Editorial beats (e.g., "climate", "fintech").
    #[serde(default)]
    pub beats: Vec<String>,

    /// Publication languages.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Preferred source domains to search within.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Only sources published after this date.
    pub min_date: Option<DateTime<Utc>>,

    /// Only sources published before this date.
    pub max_date: Option<DateTime<Utc>>,
}

impl SearchCriteria {
    /// Create empty criteria (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add target countries.
    pub fn with_countries(mut self, countries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.countries = countries.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add outlet categories.
    pub fn with_categories(
        mut self,
        categories: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.categories = categories.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add editorial beats.
    pub fn with_beats(mut self, beats: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.beats = beats.into_iter().map(|b| b.into()).collect();
        self
    }

    /// Add publication languages.
    pub fn with_languages(mut self, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.languages = languages.into_iter().map(|l| l.into()).collect();
        self
    }

    /// Add preferred source domains.
    pub fn with_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.domains = domains.into_iter().map(|d| d.into()).collect();
        self
    }

    /// Every criterion term, flattened (used for relevance scoring).
    pub fn terms(&self) -> Vec<&str> {
        self.countries
            .iter()
            .chain(&self.categories)
            .chain(&self.beats)
            .chain(&self.languages)
            .map(|s| s.as_str())
            .collect()
    }

    /// Whether no criteria are set at all.
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
            && self.categories.is_empty()
            && self.beats.is_empty()
            && self.languages.is_empty()
            && self.domains.is_empty()
            && self.min_date.is_none()
            && self.max_date.is_none()
    }
}

/// Per-job options layered on top of the criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Cap on aggregated source results.
    pub max_results: usize,

    /// Contacts below this confidence are dropped at extraction time.
    pub confidence_threshold: f32,

    /// Ask the AI collaborator for query paraphrases/expansions.
    pub enable_ai_enhancement: bool,

    /// Overall deadline override for the job (None = configured default).
    pub timeout: Option<Duration>,

    /// Scheduling priority.
    pub priority: SearchPriority,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 50,
            confidence_threshold: 0.5,
            enable_ai_enhancement: true,
            timeout: None,
            priority: SearchPriority::Normal,
        }
    }
}

impl SearchOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result cap.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Set the confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Toggle AI query enhancement.
    pub fn with_ai_enhancement(mut self, enabled: bool) -> Self {
        self.enable_ai_enhancement = enabled;
        self
    }

    /// Override the total-search deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the job priority.
    pub fn with_priority(mut self, priority: SearchPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Immutable input describing one search job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfiguration {
    /// Free-text topic (e.g., "renewable energy policy").
    pub query: String,

    /// Structured filters.
    pub criteria: SearchCriteria,

    /// Job options.
    pub options: SearchOptions,
}

impl SearchConfiguration {
    /// Create a configuration for a query with default criteria/options.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            criteria: SearchCriteria::default(),
            options: SearchOptions::default(),
        }
    }

    /// Set the criteria.
    pub fn with_criteria(mut self, criteria: SearchCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Set the options.
    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the configuration before starting a job.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        if !(0.0..=1.0).contains(&self.options.confidence_threshold) {
            return Err("confidence_threshold must be within [0, 1]".into());
        }
        if self.options.max_results == 0 {
            return Err("max_results must be positive".into());
        }
        Ok(())
    }
}

/// Per-domain rate limiting and circuit breaking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Ceiling on requests within one second.
    pub requests_per_second: u32,

    /// Ceiling on requests within one minute.
    pub requests_per_minute: u32,

    /// Ceiling on requests within one hour.
    pub requests_per_hour: u32,

    /// Minimum delay between consecutive requests to one domain.
    pub min_delay: Duration,

    /// Cap on any computed delay.
    pub max_delay: Duration,

    /// Multiplier applied per consecutive error.
    pub backoff_multiplier: f64,

    /// Honor a robots.txt crawl-delay larger than `min_delay`.
    pub respect_crawl_delay: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            requests_per_minute: 20,
            requests_per_hour: 300,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            respect_crawl_delay: true,
        }
    }
}

impl ThrottleConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-second ceiling.
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Set the per-minute ceiling.
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Set the per-hour ceiling.
    pub fn with_requests_per_hour(mut self, rph: u32) -> Self {
        self.requests_per_hour = rph;
        self
    }

    /// Set the minimum inter-request delay.
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the error backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Ignore robots.txt crawl-delay hints.
    pub fn ignore_crawl_delay(mut self) -> Self {
        self.respect_crawl_delay = false;
        self
    }
}

/// Options for the retry mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Maximum attempts (first try included).
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Cap on any computed delay.
    pub max_delay: Duration,

    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,

    /// Spread delays by up to ±25% to avoid thundering herds.
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for calls into AI services (slow, occasionally overloaded).
    pub fn ai_service() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Preset for plain network fetches.
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Preset for database operations (fast, tight budget).
    pub fn database() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// Preset for third-party APIs with their own rate limits.
    pub fn external_api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Look up a preset by name; unknown names get the default.
    pub fn preset(name: &str) -> Self {
        match name {
            "ai_service" => Self::ai_service(),
            "network" => Self::network(),
            "database" => Self::database(),
            "external_api" => Self::external_api(),
            _ => Self::default(),
        }
    }

    /// Set maximum attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter (mostly for deterministic tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Query generation tuning.
///
/// The overall score is `relevance_weight * relevance +
/// coverage_weight * coverage + diversity_weight * diversity`, which is
/// monotonic in each sub-score as long as weights are non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryGenerationConfig {
    /// Cap on returned queries.
    pub max_queries: usize,

    /// Weight of criteria-match strength in the overall score.
    pub relevance_weight: f32,

    /// Weight of criteria-dimension coverage in the overall score.
    pub coverage_weight: f32,

    /// Weight of dissimilarity from already-selected queries.
    pub diversity_weight: f32,

    /// Token-set similarity above which two queries are near-duplicates.
    pub dedup_similarity_threshold: f32,

    /// How many top template queries to send for AI enhancement.
    pub max_enhancement_candidates: usize,
}

impl Default for QueryGenerationConfig {
    fn default() -> Self {
        Self {
            max_queries: 12,
            relevance_weight: 0.5,
            coverage_weight: 0.3,
            diversity_weight: 0.2,
            dedup_similarity_threshold: 0.85,
            max_enhancement_candidates: 3,
        }
    }
}

impl QueryGenerationConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query cap.
    pub fn with_max_queries(mut self, max: usize) -> Self {
        self.max_queries = max;
        self
    }

    /// Set the near-duplicate threshold.
    pub fn with_dedup_threshold(mut self, threshold: f32) -> Self {
        self.dedup_similarity_threshold = threshold;
        self
    }
}

/// Extraction strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Byline/pattern matching only.
    RuleBased,
    /// AI structured extraction only.
    AiBased,
    /// Run both, merge non-conflicting fields.
    #[default]
    Hybrid,
}

/// Contact extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Which strategies to run.
    pub strategy: ExtractionStrategy,

    /// Cap on candidates taken from one page.
    pub max_contacts_per_page: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategy::Hybrid,
            max_contacts_per_page: 10,
        }
    }
}

impl ExtractionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the strategy.
    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Deduplication tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Bio token-overlap similarity above which contacts are duplicates.
    pub bio_similarity_threshold: f32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            bio_similarity_threshold: 0.8,
        }
    }
}

impl DedupConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bio similarity threshold.
    pub fn with_bio_threshold(mut self, threshold: f32) -> Self {
        self.bio_similarity_threshold = threshold;
        self
    }
}

/// Independent deadlines per pipeline stage plus the overall ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTimeouts {
    pub query_generation: Duration,
    pub web_search: Duration,
    pub content_scraping: Duration,
    pub contact_extraction: Duration,
    pub total_search: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            query_generation: Duration::from_secs(30),
            web_search: Duration::from_secs(120),
            content_scraping: Duration::from_secs(300),
            contact_extraction: Duration::from_secs(180),
            total_search: Duration::from_secs(900),
        }
    }
}

/// Top-level configuration for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrent jobs one orchestrator will run; further `run` calls
    /// wait for a slot.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_searches: usize,

    /// Concurrent queries dispatched within the web-search stage.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_queries: usize,

    /// Concurrent page fetches within the scraping stage.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_fetches: usize,

    /// Concurrent page extractions within the extraction stage.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_extractions: usize,

    /// Source hits requested per generated query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Per-stage deadlines.
    #[serde(default)]
    pub timeouts: StageTimeouts,

    /// Retry policy for provider calls.
    #[serde(default)]
    pub retry: RetryOptions,

    /// Per-domain throttle policy.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Query generation tuning.
    #[serde(default)]
    pub query_generation: QueryGenerationConfig,

    /// Extraction tuning.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Deduplication tuning.
    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_concurrency() -> usize {
    4
}

fn default_results_per_query() -> usize {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_searches: default_concurrency(),
            max_concurrent_queries: default_concurrency(),
            max_concurrent_fetches: default_concurrency(),
            max_concurrent_extractions: default_concurrency(),
            results_per_query: default_results_per_query(),
            timeouts: StageTimeouts::default(),
            retry: RetryOptions::default(),
            throttle: ThrottleConfig::default(),
            query_generation: QueryGenerationConfig::default(),
            extraction: ExtractionConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stage timeouts.
    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set retry options for provider calls.
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Set the throttle policy.
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set the fetch concurrency bound.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Set the query concurrency bound.
    pub fn with_max_concurrent_queries(mut self, max: usize) -> Self {
        self.max_concurrent_queries = max.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_validation() {
        assert!(SearchConfiguration::new("climate reporters").validate().is_ok());
        assert!(SearchConfiguration::new("  ").validate().is_err());

        let bad_threshold = SearchConfiguration::new("x")
            .with_options(SearchOptions::new().with_confidence_threshold(1.5));
        assert!(bad_threshold.validate().is_err());
    }

    #[test]
    fn test_criteria_terms() {
        let criteria = SearchCriteria::new()
            .with_countries(["Germany"])
            .with_beats(["climate", "energy"]);
        let terms = criteria.terms();
        assert_eq!(terms.len(), 3);
        assert!(terms.contains(&"climate"));
    }

    #[test]
    fn test_retry_presets() {
        assert_eq!(RetryOptions::preset("ai_service").max_attempts, 4);
        assert_eq!(RetryOptions::preset("database").max_attempts, 5);
        // Unknown preset names fall back to the default.
        assert_eq!(
            RetryOptions::preset("nonsense").max_attempts,
            RetryOptions::default().max_attempts
        );
    }
}
