//! End-to-end pipeline tests over mock providers.

use std::sync::Arc;
use std::time::Duration;

use contact_discovery::testing::{MockContactParser, MockContentFetcher, MockSearchProvider};
use contact_discovery::{
    DomainThrottle, DuplicateType, MemoryJobStore, OrchestratorConfig, RetryOptions,
    SearchConfiguration, SearchOptions, SearchOrchestrator, SearchStage, ThrottleConfig,
};

// The base template for a criteria-less search is deterministic, so mocks
// can key their fixtures on it.
const QUERY_TEXT: &str = "climate policy journalist email contact";

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_retry(
            RetryOptions::new()
                .with_max_attempts(2)
                .with_base_delay(Duration::from_millis(1))
                .without_jitter(),
        )
        .with_throttle(
            ThrottleConfig::new()
                .with_requests_per_second(1000)
                .with_requests_per_minute(100_000)
                .with_requests_per_hour(1_000_000)
                .with_min_delay(Duration::ZERO)
                .ignore_crawl_delay(),
        )
}

fn configuration() -> SearchConfiguration {
    SearchConfiguration::new("climate policy")
        .with_options(SearchOptions::new().with_ai_enhancement(false))
}

fn orchestrator(
    provider: MockSearchProvider,
    fetcher: MockContentFetcher,
    config: OrchestratorConfig,
) -> SearchOrchestrator<MockSearchProvider, MockContentFetcher, MemoryJobStore> {
    let throttle = Arc::new(DomainThrottle::new(config.throttle.clone()));
    SearchOrchestrator::new(provider, fetcher, MemoryJobStore::new(), throttle, config)
}

#[tokio::test]
async fn test_full_pipeline_with_deduplication() {
    let provider = MockSearchProvider::new()
        .with_urls(QUERY_TEXT, &["https://one.test/a", "https://two.test/b"]);
    let fetcher = MockContentFetcher::new()
        .with_page(
            "https://one.test/a",
            "By Jane Doe\nContact: jane.doe@example.com",
        )
        .with_page(
            "https://two.test/b",
            "Maria Schmidt — Senior Climate Correspondent\nmaria.schmidt@paper.de\nAlso by Jane Doe (jane.doe@example.com)",
        );

    let orch = orchestrator(provider, fetcher, fast_config());
    let aggregate = orch.run(configuration(), None).await.unwrap();

    assert_eq!(aggregate.stage, SearchStage::Completed);
    assert_eq!(aggregate.total_results, 2);
    assert!(aggregate.errors.is_empty());

    // Jane Doe appears on both pages with the same address.
    assert_eq!(aggregate.duplicate_groups.len(), 1);
    assert_eq!(
        aggregate.duplicate_groups[0].duplicate_type,
        DuplicateType::Email
    );
    assert_eq!(aggregate.unique_contacts, 2);
    assert_eq!(aggregate.duplicate_contacts, 1);

    let names: Vec<&str> = aggregate
        .contacts
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert!(names.contains(&"Jane Doe"));
    assert!(names.contains(&"Maria Schmidt"));

    // Metrics accumulated along the way.
    assert_eq!(aggregate.metrics.query.generated, 1);
    assert_eq!(aggregate.metrics.query.dispatched, 1);
    assert_eq!(aggregate.metrics.source.pages_fetched, 2);
    assert_eq!(aggregate.metrics.contact.extracted, 3);
    assert_eq!(aggregate.metrics.contact.unique, 2);
    assert_eq!(aggregate.metrics.contact.duplicates, 1);
}

#[tokio::test]
async fn test_duplicate_content_fetched_once_extracted_once() {
    let provider = MockSearchProvider::new().with_urls(
        QUERY_TEXT,
        &["https://one.test/a", "https://one.test/a-mirror"],
    );
    let same = "By Jane Doe\njane.doe@example.com";
    let fetcher = MockContentFetcher::new()
        .with_page("https://one.test/a", same)
        .with_page("https://one.test/a-mirror", same);

    let orch = orchestrator(provider, fetcher, fast_config());
    let aggregate = orch.run(configuration(), None).await.unwrap();

    assert_eq!(aggregate.stage, SearchStage::Completed);
    assert_eq!(aggregate.total_results, 1);
    assert_eq!(aggregate.metrics.source.duplicate_content_skipped, 1);
    assert_eq!(aggregate.unique_contacts, 1);
}

#[tokio::test]
async fn test_all_queries_failing_marks_job_failed() {
    let provider = MockSearchProvider::new().failing_on(QUERY_TEXT);
    let orch = orchestrator(provider, MockContentFetcher::new(), fast_config());

    let aggregate = orch.run(configuration(), None).await.unwrap();

    assert_eq!(aggregate.stage, SearchStage::Failed);
    assert_eq!(aggregate.total_results, 0);
    // Zero results WITH errors: distinguishable from an empty success.
    assert!(!aggregate.errors.is_empty());
    assert_eq!(aggregate.metrics.query.failed, 1);
}

#[tokio::test]
async fn test_zero_results_without_errors_is_success() {
    let orch = orchestrator(
        MockSearchProvider::new(),
        MockContentFetcher::new(),
        fast_config(),
    );
    let aggregate = orch.run(configuration(), None).await.unwrap();

    assert_eq!(aggregate.stage, SearchStage::Completed);
    assert_eq!(aggregate.total_results, 0);
    assert!(aggregate.errors.is_empty());
}

#[tokio::test]
async fn test_failed_fetch_degrades_to_snippet_result() {
    let provider = MockSearchProvider::new().with_hits(
        QUERY_TEXT,
        vec![contact_discovery::SourceHit::from_url("https://one.test/a")
            .unwrap()
            .with_title("Climate desk")
            .with_snippet("By Jane Doe — jane.doe@example.com")],
    );
    // The fetcher knows nothing about the URL, so the full fetch 404s.
    let orch = orchestrator(provider, MockContentFetcher::new(), fast_config());
    let aggregate = orch.run(configuration(), None).await.unwrap();

    assert_eq!(aggregate.stage, SearchStage::Completed);
    assert_eq!(aggregate.total_results, 1);
    assert_eq!(aggregate.metrics.source.fetch_failures, 1);
    // The snippet was still worth extracting from.
    assert_eq!(aggregate.unique_contacts, 1);
    assert!(!aggregate.errors.is_empty());
}

#[tokio::test]
async fn test_cancellation_preserves_completed_results() {
    let provider = MockSearchProvider::new().with_urls(
        QUERY_TEXT,
        &[
            "https://one.test/a",
            "https://two.test/b",
            "https://zzz.test/c",
        ],
    );
    let fetcher = MockContentFetcher::new()
        .with_page("https://one.test/a", "By Jane Doe\njane.doe@example.com")
        .with_page("https://two.test/b", "By Max Power\nmax.power@daily.com")
        .with_page("https://zzz.test/c", "By Slow Page\nslow.page@late.com");

    // Serial extraction with a parser that stalls on the last page.
    let parser = Arc::new(
        MockContactParser::new().with_delay("https://zzz.test/c", Duration::from_secs(30)),
    );
    let mut config = fast_config();
    config.max_concurrent_extractions = 1;

    let orch = Arc::new(
        orchestrator(provider, fetcher, config).with_parser(parser),
    );

    let runner = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.run(configuration(), None).await })
    };

    // Wait for the job to register, then let the first two extractions
    // finish before cancelling mid-flight on the third.
    let search_id = loop {
        let active = orch.active_searches();
        if let Some(&id) = active.first() {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(orch.cancel(search_id, "user requested"));

    let aggregate = runner.await.unwrap().unwrap();

    assert_eq!(aggregate.stage, SearchStage::Cancelled);
    // Exactly the two completed results survive; the in-flight page does not.
    assert_eq!(aggregate.total_results, 2);
    assert_eq!(aggregate.unique_contacts, 2);
    assert!(aggregate.metrics.source.pages_fetched >= 2);
}

#[tokio::test]
async fn test_total_timeout_marks_job_failed() {
    let provider = MockSearchProvider::new().with_urls(QUERY_TEXT, &["https://one.test/a"]);
    let fetcher = MockContentFetcher::new().with_delay(
        "https://one.test/a",
        Duration::from_secs(30),
    );

    let config = fast_config();
    let orch = orchestrator(provider, fetcher, config);

    let search = configuration()
        .with_options(
            SearchOptions::new()
                .with_ai_enhancement(false)
                .with_timeout(Duration::from_millis(300)),
        );
    let aggregate = orch.run(search, None).await.unwrap();

    assert_eq!(aggregate.stage, SearchStage::Failed);
    assert!(aggregate
        .errors
        .iter()
        .any(|e| e.message.contains("timed out")));
}
