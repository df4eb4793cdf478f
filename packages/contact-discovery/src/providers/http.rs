//! Plain HTTP content fetcher.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::provider::{ContentFetcher, FetchedPage};

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

/// Fetches pages over HTTP with a polite user agent.
///
/// Suitable for server-rendered sites; JavaScript-heavy sites need a
/// headless scrape provider behind the same trait.
pub struct HttpContentFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpContentFetcher {
    /// Create a fetcher with a 30s request timeout.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            user_agent: "ContactDiscoveryBot/1.0".to_string(),
        }
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Transport(Box::new(e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().clone();

        let mut metadata: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (format!("http_{}", k.as_str()), v.to_string()))
            })
            .collect();
        metadata.insert("http_status".to_string(), status.as_u16().to_string());

        let content = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(Box::new(e)))?;

        let title = title_re()
            .captures(&content)
            .map(|cap| cap[1].trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(FetchedPage {
            url: final_url,
            content,
            title,
            status: status.as_u16(),
            metadata,
            fetched_at: Utc::now(),
        })
    }
}
