//! Core trait abstractions.

pub mod provider;
pub mod store;

pub use provider::{
    ContactParser, ContentFetcher, FetchedPage, ParsedContact, QueryEnhancer, SearchProvider,
    SearchProviderOptions, SourceHit,
};
pub use store::JobStore;
