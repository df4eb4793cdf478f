//! Tavily-backed search provider.

use async_trait::async_trait;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::security::ApiKey;
use crate::traits::provider::{SearchProvider, SearchProviderOptions, SourceHit};

/// Search provider backed by the Tavily API.
pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    search_depth: String,
}

impl TavilySearchProvider {
    /// Create a provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: ApiKey::new(api_key),
            search_depth: "basic".to_string(),
        }
    }

    /// Set search depth ("basic" or "advanced").
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    /// Use a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchProviderOptions,
    ) -> FetchResult<Vec<SourceHit>> {
        #[derive(serde::Serialize)]
        struct Request<'a> {
            query: &'a str,
            search_depth: &'a str,
            include_domains: &'a [String],
            max_results: usize,
        }

        #[derive(serde::Deserialize)]
        struct Response {
            results: Vec<TavilyResult>,
        }

        #[derive(serde::Deserialize)]
        struct TavilyResult {
            url: String,
            title: Option<String>,
            content: Option<String>,
            score: Option<f32>,
        }

        let request = Request {
            query,
            search_depth: &self.search_depth,
            include_domains: &options.include_domains,
            max_results: options.max_results.max(1),
        };

        let response = self
            .client
            .post("https://api.tavily.com/search")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::Transport(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: "https://api.tavily.com/search".to_string(),
            });
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| FetchError::Transport(Box::new(e)))?;

        let hits = body
            .results
            .into_iter()
            .filter_map(|r| {
                let url = Url::parse(&r.url).ok()?;
                let mut hit = SourceHit::new(url);
                if let Some(title) = r.title {
                    hit = hit.with_title(title);
                }
                if let Some(content) = r.content {
                    hit = hit.with_snippet(content);
                }
                if let Some(score) = r.score {
                    hit = hit.with_score(score);
                }
                Some(hit)
            })
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a real Tavily API key; ignored by default.
    #[tokio::test]
    #[ignore]
    async fn test_tavily_search() {
        let api_key = std::env::var("TAVILY_API_KEY").expect("TAVILY_API_KEY required");
        let provider = TavilySearchProvider::new(api_key);

        let hits = provider
            .search(
                "climate journalist contact",
                &SearchProviderOptions::with_max_results(5),
            )
            .await
            .unwrap();
        assert!(!hits.is_empty());
    }
}
