//! Media-Contact Discovery Library
//!
//! A query-driven pipeline that turns search criteria into verified-ready
//! media contacts: generate queries, search the web, scrape sources,
//! extract contact candidates, and deduplicate them into one record per
//! person.
//!
//! # Design Philosophy
//!
//! - Providers are collaborators: search, scrape, and AI live behind
//!   traits and are swappable (and optional, for the AI ones)
//! - Degrade, don't abort: per-source failures are recorded on the job,
//!   never thrown at the caller
//! - One stage at a time: jobs move through a fixed state machine with
//!   monotonic progress and absorbing terminal states
//! - Shared budgets: all jobs draw from one per-domain throttle
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use contact_discovery::{
//!     DomainThrottle, MemoryJobStore, OrchestratorConfig, SearchConfiguration,
//!     SearchCriteria, SearchOrchestrator,
//! };
//! use contact_discovery::providers::{HttpContentFetcher, TavilySearchProvider};
//!
//! let throttle = Arc::new(DomainThrottle::default());
//! let orchestrator = SearchOrchestrator::new(
//!     TavilySearchProvider::new(api_key),
//!     HttpContentFetcher::new(),
//!     MemoryJobStore::new(),
//!     throttle,
//!     OrchestratorConfig::new(),
//! );
//!
//! let configuration = SearchConfiguration::new("renewable energy policy")
//!     .with_criteria(SearchCriteria::new().with_countries(["Germany"]));
//! let aggregate = orchestrator.run(configuration, None).await?;
//! println!("{} unique contacts", aggregate.unique_contacts);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (SearchProvider, ContentFetcher, AI, JobStore)
//! - [`types`] - Domain types and configuration
//! - [`orchestrator`] - The job state machine
//! - [`querygen`] - Query templates, scoring, AI enhancement
//! - [`extract`] - Rule-based / AI / hybrid contact extraction
//! - [`dedup`] - Duplicate grouping and representative selection
//! - [`throttle`] - Per-domain rate limiting and circuit breaking
//! - [`retry`] - Exponential-backoff executor
//! - [`providers`] - Bundled Tavily/HTTP providers
//! - [`stores`] - Storage implementations
//! - [`testing`] - Mock implementations for testing

pub mod dedup;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod providers;
pub mod querygen;
pub mod retry;
pub mod robots;
pub mod security;
pub mod stores;
pub mod testing;
pub mod throttle;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    classify_failure, DiscoveryError, ErrorCategory, FailureKind, FetchError, RecoveryStrategy,
};
pub use traits::{
    provider::{
        ContactParser, ContentFetcher, FetchedPage, ParsedContact, QueryEnhancer, SearchProvider,
        SearchProviderOptions, SourceHit,
    },
    store::JobStore,
};
pub use types::{
    AggregatedSearchResult, DedupConfig, DuplicateGroup, DuplicateType, ExtractedContact,
    ExtractionConfig, ExtractionMethod, ExtractionStrategy, GeneratedQuery, JobError,
    OrchestratorConfig, QueryGenerationConfig, QueryScores, QueryType, RetryOptions,
    SearchConfiguration, SearchCriteria, SearchJob, SearchMetrics, SearchOptions, SearchPriority,
    SearchProgress, SearchResult, SearchStage, SourceType, StageTimeouts, ThrottleConfig,
    VerificationStatus,
};

// Re-export the pipeline components
pub use dedup::{DedupOutcome, Deduplicator};
pub use extract::{ContactExtractor, ExtractionOutcome};
pub use orchestrator::SearchOrchestrator;
pub use querygen::QueryGenerator;
pub use retry::{RetryFailure, RetryOutcome, Retryer};
pub use robots::RobotsRules;
pub use security::ApiKey;
pub use throttle::{DomainThrottle, ThrottleDecision, ThrottleSnapshot};

// Re-export stores and providers
pub use providers::{HttpContentFetcher, TavilySearchProvider};
pub use stores::MemoryJobStore;
