//! Collaborator seams for search, fetch, and AI providers.
//!
//! The library is the mechanical engine; providers are swappable
//! collaborators behind these traits. AI collaborators are optional
//! everywhere: absence or failure degrades the pipeline, never aborts it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{FetchResult, Result};
use crate::types::config::SearchCriteria;

/// A hit returned by a web search provider.
#[derive(Debug, Clone)]
pub struct SourceHit {
    pub url: Url,

    /// Title of the page, if the provider surfaces one.
    pub title: Option<String>,

    /// Snippet/description from the result listing.
    pub snippet: Option<String>,

    /// Provider-reported relevance (0.0–1.0).
    pub score: Option<f32>,
}

impl SourceHit {
    /// Create a hit from a URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            snippet: None,
            score: None,
        }
    }

    /// Create from a URL string, if it parses.
    pub fn from_url(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(Self::new)
    }

    /// Add a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a snippet.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Add a relevance score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Per-call options for a search provider.
#[derive(Debug, Clone, Default)]
pub struct SearchProviderOptions {
    /// Cap on returned hits.
    pub max_results: usize,

    /// Restrict results to these domains (empty = open web).
    pub include_domains: Vec<String>,
}

impl SearchProviderOptions {
    /// Options with a result cap.
    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            max_results,
            include_domains: Vec::new(),
        }
    }

    /// Restrict to specific domains.
    pub fn with_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_domains = domains.into_iter().map(|d| d.into()).collect();
        self
    }
}

/// Web search collaborator.
///
/// Expected to raise a [`crate::error::FetchError`] on HTTP failure so the
/// throttle/retry layers can classify it.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web for sources matching `query`.
    async fn search(&self, query: &str, options: &SearchProviderOptions)
        -> FetchResult<Vec<SourceHit>>;
}

/// A fetched page, ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,

    /// Body text (HTML or extracted text, provider-dependent).
    pub content: String,

    pub title: Option<String>,

    /// HTTP status of the final response.
    pub status: u16,

    /// Response headers and other provider metadata.
    pub metadata: HashMap<String, String>,

    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Create a page from a URL and its body.
    pub fn new(url: Url, content: impl Into<String>) -> Self {
        Self {
            url,
            content: content.into(),
            title: None,
            status: 200,
            metadata: HashMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Add a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Content fetch collaborator (scrape provider).
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch one page.
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedPage>;
}

/// AI query-enhancement collaborator.
///
/// Optional: the query generator falls back to template-only output when
/// the enhancer is absent or failing.
#[async_trait]
pub trait QueryEnhancer: Send + Sync {
    /// Produce paraphrases/expansions of `query` given the search criteria.
    async fn enhance(&self, query: &str, context: &SearchCriteria) -> Result<Vec<String>>;
}

/// A contact candidate as returned by the AI parser, before scoring.
#[derive(Debug, Clone, Default)]
pub struct ParsedContact {
    pub name: String,
    pub title: Option<String>,
    pub outlet: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub social_profiles: Vec<String>,
    /// Parser's certainty this is a genuine contact.
    pub confidence: f32,
}

/// AI structured-extraction collaborator.
///
/// Optional: extraction degrades to rule-based output when the parser is
/// absent or failing.
#[async_trait]
pub trait ContactParser: Send + Sync {
    /// Parse contact candidates out of page content.
    async fn parse_contacts(&self, content: &str, url: &Url) -> Result<Vec<ParsedContact>>;
}
