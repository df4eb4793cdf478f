//! Testing utilities including mock providers.
//!
//! Useful for testing applications built on the discovery pipeline
//! without real search, scrape, or AI calls. All mocks are deterministic,
//! support failure injection, and record their calls for assertions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{DiscoveryError, FetchError, FetchResult, Result};
use crate::traits::provider::{
    ContactParser, ContentFetcher, FetchedPage, ParsedContact, QueryEnhancer, SearchProvider,
    SearchProviderOptions, SourceHit,
};
use crate::types::config::SearchCriteria;

/// Record of a call made to a mock provider.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Search { query: String },
    Fetch { url: String },
    Enhance { query: String },
    Parse { url: String },
}

/// Search provider returning canned hits per query.
#[derive(Default)]
pub struct MockSearchProvider {
    hits: RwLock<HashMap<String, Vec<SourceHit>>>,
    fail_queries: RwLock<Vec<String>>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockSearchProvider {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add hits for a query.
    pub fn with_hits(self, query: &str, hits: Vec<SourceHit>) -> Self {
        self.hits.write().unwrap().insert(query.to_string(), hits);
        self
    }

    /// Add URL strings as hits for a query.
    pub fn with_urls(self, query: &str, urls: &[&str]) -> Self {
        let hits = urls.iter().filter_map(|u| SourceHit::from_url(u)).collect();
        self.with_hits(query, hits)
    }

    /// Make a query fail with a 503.
    pub fn failing_on(self, query: &str) -> Self {
        self.fail_queries.write().unwrap().push(query.to_string());
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchProviderOptions,
    ) -> FetchResult<Vec<SourceHit>> {
        self.calls.write().unwrap().push(MockCall::Search {
            query: query.to_string(),
        });

        if self.fail_queries.read().unwrap().iter().any(|q| q == query) {
            return Err(FetchError::Status {
                status: 503,
                url: "https://search.mock/".to_string(),
            });
        }

        let mut hits = self
            .hits
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        if options.max_results > 0 {
            hits.truncate(options.max_results);
        }
        Ok(hits)
    }
}

/// Content fetcher returning canned pages per URL.
#[derive(Default)]
pub struct MockContentFetcher {
    pages: RwLock<HashMap<String, String>>,
    fail_urls: RwLock<Vec<String>>,
    delays: RwLock<HashMap<String, Duration>>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockContentFetcher {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page body for a URL.
    pub fn with_page(self, url: &str, content: &str) -> Self {
        self.pages
            .write()
            .unwrap()
            .insert(url.to_string(), content.to_string());
        self
    }

    /// Make a URL fail with a 500.
    pub fn failing_on(self, url: &str) -> Self {
        self.fail_urls.write().unwrap().push(url.to_string());
        self
    }

    /// Delay responses for a URL (for cancellation tests).
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays
            .write()
            .unwrap()
            .insert(url.to_string(), delay);
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for MockContentFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedPage> {
        let key = url.to_string();
        self.calls
            .write()
            .unwrap()
            .push(MockCall::Fetch { url: key.clone() });

        let delay = self.delays.read().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_urls.read().unwrap().iter().any(|u| *u == key) {
            return Err(FetchError::Status {
                status: 500,
                url: key,
            });
        }

        let content =
            self.pages
                .read()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(FetchError::Status {
                    status: 404,
                    url: key,
                })?;
        Ok(FetchedPage::new(url.clone(), content))
    }
}

/// Query enhancer returning canned expansions.
#[derive(Default)]
pub struct MockQueryEnhancer {
    expansions: RwLock<HashMap<String, Vec<String>>>,
    always_fail: RwLock<bool>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockQueryEnhancer {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add expansions for a query.
    pub fn with_expansions(self, query: &str, expansions: &[&str]) -> Self {
        self.expansions.write().unwrap().insert(
            query.to_string(),
            expansions.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Make every call fail.
    pub fn always_failing(self) -> Self {
        *self.always_fail.write().unwrap() = true;
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl QueryEnhancer for MockQueryEnhancer {
    async fn enhance(&self, query: &str, _context: &SearchCriteria) -> Result<Vec<String>> {
        self.calls.write().unwrap().push(MockCall::Enhance {
            query: query.to_string(),
        });
        if *self.always_fail.read().unwrap() {
            return Err(DiscoveryError::Ai("enhancer unavailable".into()));
        }
        Ok(self
            .expansions
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}

/// Contact parser returning canned contacts per URL.
#[derive(Default)]
pub struct MockContactParser {
    contacts: RwLock<HashMap<String, Vec<ParsedContact>>>,
    delays: RwLock<HashMap<String, Duration>>,
    always_fail: RwLock<bool>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockContactParser {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add parsed contacts for a URL.
    pub fn with_contacts(self, url: &str, contacts: Vec<ParsedContact>) -> Self {
        self.contacts
            .write()
            .unwrap()
            .insert(url.to_string(), contacts);
        self
    }

    /// Delay parsing for a URL (for cancellation tests).
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays
            .write()
            .unwrap()
            .insert(url.to_string(), delay);
        self
    }

    /// Make every call fail.
    pub fn always_failing(self) -> Self {
        *self.always_fail.write().unwrap() = true;
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl ContactParser for MockContactParser {
    async fn parse_contacts(&self, _content: &str, url: &Url) -> Result<Vec<ParsedContact>> {
        self.calls.write().unwrap().push(MockCall::Parse {
            url: url.to_string(),
        });
        let delay = self.delays.read().unwrap().get(url.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.always_fail.read().unwrap() {
            return Err(DiscoveryError::Ai("parser unavailable".into()));
        }
        Ok(self
            .contacts
            .read()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or_default())
    }
}
