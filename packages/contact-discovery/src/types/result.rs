//! Source results gathered during a search job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::types::contact::ExtractedContact;

/// Which collaborator produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Built from a search provider hit (snippet only, no full fetch).
    SearchProvider,
    /// Built from a fetched/scraped page.
    ScrapeProvider,
    /// Entered by hand.
    Manual,
}

/// One source page and the contacts extracted from it.
///
/// Append-only within a job; never mutated after creation apart from the
/// extraction stage filling `contacts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Uuid,

    pub url: Url,

    pub title: Option<String>,

    /// Registrable host of `url`.
    pub domain: String,

    /// Heuristic authority of the source domain.
    pub authority_score: f32,

    /// Fit of the page to the search criteria.
    pub relevance_score: f32,

    /// Aggregate certainty of the page's extracted contacts.
    pub confidence_score: f32,

    /// Reference to the raw content (sha256 hex of the fetched body).
    pub content_hash: Option<String>,

    #[serde(default)]
    pub contacts: Vec<ExtractedContact>,

    pub source_type: SourceType,

    /// Free-form notes (fetch headers, extraction failures, etc.).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SearchResult {
    /// Create a result for a URL.
    pub fn new(url: Url, source_type: SourceType) -> Self {
        let domain = url.host_str().unwrap_or_default().to_string();
        Self {
            id: Uuid::new_v4(),
            url,
            title: None,
            domain,
            authority_score: 0.0,
            relevance_score: 0.0,
            confidence_score: 0.0,
            content_hash: None,
            contacts: Vec::new(),
            source_type,
            metadata: HashMap::new(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the relevance score.
    pub fn with_relevance(mut self, score: f32) -> Self {
        self.relevance_score = score;
        self
    }

    /// Hash of the raw content, recorded as the content reference.
    pub fn set_content(&mut self, content: &str) {
        self.content_hash = Some(content_hash(content));
    }

    /// Recompute the page-level confidence from its contacts.
    pub fn refresh_confidence(&mut self) {
        if self.contacts.is_empty() {
            self.confidence_score = 0.0;
        } else {
            let sum: f32 = self.contacts.iter().map(|c| c.confidence_score).sum();
            self.confidence_score = sum / self.contacts.len() as f32;
        }
    }
}

/// Sha256 hex digest of page content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Heuristic authority of a source domain.
///
/// Provider-reported score wins when present; otherwise apex domains on
/// common TLDs get a modest baseline over deep subdomains.
pub fn authority_score(url: &Url, provider_score: Option<f32>) -> f32 {
    if let Some(score) = provider_score {
        return score.clamp(0.0, 1.0);
    }

    let host = url.host_str().unwrap_or_default();
    let labels = host.split('.').count();
    let mut score: f32 = 0.5;
    if labels <= 2 {
        score += 0.1;
    }
    if host.ends_with(".org") || host.ends_with(".com") || host.ends_with(".net") {
        score += 0.05;
    }
    if url.scheme() == "https" {
        score += 0.05;
    }
    score.min(1.0)
}
