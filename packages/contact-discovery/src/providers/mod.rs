//! Bundled provider implementations.

pub mod http;
pub mod tavily;

pub use http::HttpContentFetcher;
pub use tavily::TavilySearchProvider;
