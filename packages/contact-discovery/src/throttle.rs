//! Per-domain request throttling and circuit breaking.
//!
//! All jobs in the process share one [`DomainThrottle`]: the state map is
//! keyed by domain, so concurrent searches contending for the same site
//! draw from the same budget. State is guarded by a plain mutex with no
//! awaits inside the critical section, so interleaved async callers cannot
//! lose counter updates.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{DiscoveryError, FailureKind, FetchError, FetchResult, Result};
use crate::types::config::ThrottleConfig;

/// Consecutive errors that trip the circuit breaker.
const BLOCK_THRESHOLD: u32 = 5;

/// How long a tripped domain stays blocked.
const BLOCK_WINDOW: Duration = Duration::from_secs(300);

/// Idle domains older than this are swept by [`DomainThrottle::cleanup`].
const IDLE_EXPIRY: Duration = Duration::from_secs(3600);

const ONE_SECOND: Duration = Duration::from_secs(1);
const ONE_MINUTE: Duration = Duration::from_secs(60);
const ONE_HOUR: Duration = Duration::from_secs(3600);

/// Outcome of a throttle check.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleDecision {
    pub allowed: bool,

    /// Suggested wait before trying again (zero when allowed).
    pub delay: Duration,

    /// Why the request was denied.
    pub reason: Option<String>,

    /// Remaining block window, when denied by the circuit breaker.
    pub retry_after: Option<Duration>,
}

impl ThrottleDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            delay: Duration::ZERO,
            reason: None,
            retry_after: None,
        }
    }

    fn deny(delay: Duration, reason: &str) -> Self {
        Self {
            allowed: false,
            delay,
            reason: Some(reason.to_string()),
            retry_after: None,
        }
    }

    fn deny_blocked(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            delay: retry_after,
            reason: Some("Domain temporarily blocked".to_string()),
            retry_after: Some(retry_after),
        }
    }
}

/// Read-only view of one domain's throttle state, for callers and tests.
#[derive(Debug, Clone)]
pub struct ThrottleSnapshot {
    pub second_count: u32,
    pub minute_count: u32,
    pub hour_count: u32,
    pub consecutive_errors: u32,
    pub is_blocked: bool,
    /// Remaining block window, if blocked.
    pub blocked_for: Option<Duration>,
    /// Backoff applied by the most recent error, if any.
    pub current_backoff: Option<Duration>,
    /// Time until the next request would be allowed by `next_allowed_request`.
    pub next_allowed_in: Duration,
}

#[derive(Debug)]
struct DomainState {
    second_count: u32,
    minute_count: u32,
    hour_count: u32,
    last_request: Option<Instant>,
    next_allowed_request: Option<Instant>,
    consecutive_errors: u32,
    current_backoff: Option<Duration>,
    is_blocked: bool,
    block_until: Option<Instant>,
    last_touched: Instant,
}

impl DomainState {
    fn new(now: Instant) -> Self {
        Self {
            second_count: 0,
            minute_count: 0,
            hour_count: 0,
            last_request: None,
            next_allowed_request: None,
            consecutive_errors: 0,
            current_backoff: None,
            is_blocked: false,
            block_until: None,
            last_touched: now,
        }
    }

    /// Window counters reset independently once `last_request` predates
    /// that window's boundary. Lazy, invoked on every check.
    fn prune_windows(&mut self, now: Instant) {
        let Some(last) = self.last_request else {
            return;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= ONE_SECOND {
            self.second_count = 0;
        }
        if elapsed >= ONE_MINUTE {
            self.minute_count = 0;
        }
        if elapsed >= ONE_HOUR {
            self.hour_count = 0;
        }
    }
}

/// Process-wide, domain-keyed rate limiter and circuit breaker.
///
/// Construct once at startup and hand a reference (or `Arc`) to whichever
/// component issues outbound requests. Lifecycle is explicit: call
/// [`DomainThrottle::cleanup`] from a scheduler; nothing runs on a timer.
pub struct DomainThrottle {
    config: ThrottleConfig,
    states: Mutex<HashMap<String, DomainState>>,
}

impl Default for DomainThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl DomainThrottle {
    /// Create a throttle with the given default policy.
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a request to `url` may be issued right now.
    pub fn check_request(
        &self,
        url: &str,
        crawl_delay: Option<Duration>,
    ) -> Result<ThrottleDecision> {
        self.check_request_with(url, None, crawl_delay)
    }

    /// Check with a per-call config override merged over the default.
    pub fn check_request_with(
        &self,
        url: &str,
        overrides: Option<&ThrottleConfig>,
        crawl_delay: Option<Duration>,
    ) -> Result<ThrottleDecision> {
        let domain = domain_of(url)?;
        let config = overrides.unwrap_or(&self.config);
        let now = Instant::now();

        let mut states = self.states.lock().unwrap();
        let state = states
            .entry(domain)
            .or_insert_with(|| DomainState::new(now));
        state.last_touched = now;

        // Circuit breaker first.
        if state.is_blocked {
            if let Some(until) = state.block_until {
                if now < until {
                    return Ok(ThrottleDecision::deny_blocked(until - now));
                }
            }
            state.is_blocked = false;
            state.block_until = None;
            state.consecutive_errors = 0;
        }

        state.prune_windows(now);

        // Ceilings, narrowest window first.
        if state.second_count >= config.requests_per_second {
            return Ok(ThrottleDecision::deny(
                Duration::from_millis(1000),
                "Requests per second limit exceeded",
            ));
        }
        if state.minute_count >= config.requests_per_minute {
            return Ok(ThrottleDecision::deny(
                Duration::from_millis(60_000),
                "Requests per minute limit exceeded",
            ));
        }
        if state.hour_count >= config.requests_per_hour {
            return Ok(ThrottleDecision::deny(
                Duration::from_millis(3_600_000),
                "Requests per hour limit exceeded",
            ));
        }

        // Minimum inter-request delay, scaled while the domain is erroring.
        let mut min_delay = config.min_delay;
        if config.respect_crawl_delay {
            if let Some(cd) = crawl_delay {
                if cd > min_delay {
                    min_delay = cd;
                }
            }
        }
        let required = scale_backoff(
            min_delay,
            config.backoff_multiplier,
            state.consecutive_errors,
            config.max_delay,
        );
        if let Some(last) = state.last_request {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < required {
                return Ok(ThrottleDecision::deny(
                    required - elapsed,
                    "Minimum request delay not met",
                ));
            }
        }

        Ok(ThrottleDecision::allow())
    }

    /// Record a successfully issued request.
    pub fn record_request(&self, url: &str) -> Result<()> {
        let domain = domain_of(url)?;
        let now = Instant::now();

        let mut states = self.states.lock().unwrap();
        let state = states
            .entry(domain)
            .or_insert_with(|| DomainState::new(now));
        state.last_request = Some(now);
        state.next_allowed_request = Some(now + self.config.min_delay);
        state.second_count = state.second_count.saturating_add(1);
        state.minute_count = state.minute_count.saturating_add(1);
        state.hour_count = state.hour_count.saturating_add(1);
        state.consecutive_errors = 0;
        state.current_backoff = None;
        state.last_touched = now;
        Ok(())
    }

    /// Record a failed request, backing off and eventually tripping the
    /// circuit breaker.
    pub fn record_error(&self, url: &str, kind: FailureKind) -> Result<()> {
        let domain = domain_of(url)?;
        let now = Instant::now();

        let mut states = self.states.lock().unwrap();
        let state = states
            .entry(domain.clone())
            .or_insert_with(|| DomainState::new(now));

        state.consecutive_errors = state.consecutive_errors.saturating_add(1);
        let backoff = scale_backoff(
            self.config.min_delay,
            self.config.backoff_multiplier,
            state.consecutive_errors - 1,
            self.config.max_delay,
        );
        state.next_allowed_request = Some(now + backoff);
        state.current_backoff = Some(backoff);
        state.last_touched = now;

        if state.consecutive_errors >= BLOCK_THRESHOLD {
            state.is_blocked = true;
            state.block_until = Some(now + BLOCK_WINDOW);
            tracing::warn!(
                domain = %domain,
                errors = state.consecutive_errors,
                failure_kind = ?kind,
                "domain blocked for {}s",
                BLOCK_WINDOW.as_secs()
            );
        } else {
            tracing::debug!(
                domain = %domain,
                errors = state.consecutive_errors,
                failure_kind = ?kind,
                backoff_ms = backoff.as_millis() as u64,
                "domain backoff raised"
            );
        }
        Ok(())
    }

    /// Suspend until a request to `url` is allowed (or cancellation fires).
    pub async fn wait_for_request(
        &self,
        url: &str,
        crawl_delay: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        loop {
            let decision = self.check_request(url, crawl_delay)?;
            if decision.allowed {
                return Ok(());
            }
            let wait = decision.retry_after.unwrap_or(decision.delay);
            tracing::debug!(
                url = %url,
                wait_ms = wait.as_millis() as u64,
                reason = decision.reason.as_deref().unwrap_or(""),
                "throttled, waiting"
            );
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(DiscoveryError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Wait for clearance, run `op`, and feed the outcome back into the
    /// throttle state.
    pub async fn execute<T, F, Fut>(
        &self,
        url: &str,
        crawl_delay: Option<Duration>,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = FetchResult<T>>,
    {
        self.wait_for_request(url, crawl_delay, cancel).await?;
        match op().await {
            Ok(value) => {
                self.record_request(url)?;
                Ok(value)
            }
            Err(err) => {
                self.record_error(url, err.failure_kind())?;
                Err(DiscoveryError::Fetch(err))
            }
        }
    }

    /// Sweep domain states untouched for over an hour and not blocked.
    ///
    /// Invoke from an external scheduler; returns the number of entries
    /// removed.
    pub fn cleanup(&self) -> usize {
        let mut states = self.states.lock().unwrap();
        let before = states.len();
        states.retain(|_, s| s.is_blocked || s.last_touched.elapsed() < IDLE_EXPIRY);
        before - states.len()
    }

    /// Number of tracked domains.
    pub fn domain_count(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    /// Snapshot of one domain's state, if tracked.
    pub fn snapshot(&self, url: &str) -> Result<Option<ThrottleSnapshot>> {
        let domain = domain_of(url)?;
        let now = Instant::now();
        let states = self.states.lock().unwrap();
        Ok(states.get(&domain).map(|s| ThrottleSnapshot {
            second_count: s.second_count,
            minute_count: s.minute_count,
            hour_count: s.hour_count,
            consecutive_errors: s.consecutive_errors,
            is_blocked: s.is_blocked,
            blocked_for: s
                .block_until
                .map(|until| until.saturating_duration_since(now)),
            current_backoff: s.current_backoff,
            next_allowed_in: s
                .next_allowed_request
                .map(|at| at.saturating_duration_since(now))
                .unwrap_or(Duration::ZERO),
        }))
    }
}

/// `base * multiplier^exponent`, capped at `max`.
fn scale_backoff(base: Duration, multiplier: f64, exponent: u32, max: Duration) -> Duration {
    let scaled = base.as_secs_f64() * multiplier.powi(exponent as i32);
    Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
}

fn domain_of(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|_| {
        DiscoveryError::Fetch(FetchError::InvalidUrl {
            url: url.to_string(),
        })
    })?;
    parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| {
            DiscoveryError::Fetch(FetchError::InvalidUrl {
                url: url.to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ThrottleConfig {
        ThrottleConfig::new()
            .with_requests_per_second(2)
            .with_min_delay(Duration::ZERO)
    }

    #[test]
    fn test_per_second_ceiling_invariant() {
        let throttle = DomainThrottle::new(fast_config());
        let url = "https://a.test/page";

        for _ in 0..2 {
            assert!(throttle.check_request(url, None).unwrap().allowed);
            throttle.record_request(url).unwrap();
        }

        let decision = throttle.check_request(url, None).unwrap();
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Requests per second limit exceeded")
        );
        assert_eq!(decision.delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_rate_limit_denial_scenario() {
        // requests_per_second: 1 with the default min_delay; the ceiling
        // check fires before the min-delay check, fixing the reason text.
        let throttle = DomainThrottle::new(ThrottleConfig::new().with_requests_per_second(1));

        let first = throttle.check_request("https://a.test/x", None).unwrap();
        assert!(first.allowed);
        throttle.record_request("https://a.test/x").unwrap();

        let second = throttle.check_request("https://a.test/y", None).unwrap();
        assert!(!second.allowed);
        assert_eq!(
            second.reason.as_deref(),
            Some("Requests per second limit exceeded")
        );
    }

    #[test]
    fn test_backoff_growth_capped() {
        let config = ThrottleConfig::new()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_backoff_multiplier(2.0);
        let throttle = DomainThrottle::new(config);
        let url = "https://a.test/";

        let mut last = Duration::ZERO;
        for expected in [1.0f64, 2.0, 3.0, 3.0] {
            throttle.record_error(url, FailureKind::Network).unwrap();
            let snap = throttle.snapshot(url).unwrap().unwrap();
            let backoff = snap.current_backoff.unwrap();
            assert!(backoff >= last, "backoff must be non-decreasing");
            assert!((backoff.as_secs_f64() - expected).abs() < 0.01);
            last = backoff;
        }
    }

    #[test]
    fn test_block_threshold() {
        let throttle = DomainThrottle::default();
        let url = "https://a.test/";

        for _ in 0..4 {
            throttle.record_error(url, FailureKind::Server).unwrap();
            assert!(!throttle.snapshot(url).unwrap().unwrap().is_blocked);
        }
        throttle.record_error(url, FailureKind::Server).unwrap();

        let snap = throttle.snapshot(url).unwrap().unwrap();
        assert!(snap.is_blocked);

        let decision = throttle.check_request(url, None).unwrap();
        assert!(!decision.allowed);
        let retry_after = decision.retry_after.expect("blocked denial carries retry_after");
        assert!(retry_after > Duration::from_secs(295));
        assert!(retry_after <= Duration::from_secs(300));
        assert_eq!(decision.reason.as_deref(), Some("Domain temporarily blocked"));
    }

    #[test]
    fn test_domains_are_isolated() {
        let throttle = DomainThrottle::default();
        for _ in 0..5 {
            throttle
                .record_error("https://a.test/", FailureKind::Network)
                .unwrap();
        }
        assert!(throttle.snapshot("https://a.test/").unwrap().unwrap().is_blocked);
        assert!(throttle.check_request("https://b.test/", None).unwrap().allowed);
    }

    #[test]
    fn test_crawl_delay_raises_min_delay() {
        let config = ThrottleConfig::new()
            .with_requests_per_second(10)
            .with_min_delay(Duration::from_millis(10));
        let throttle = DomainThrottle::new(config);
        let url = "https://a.test/";

        throttle.record_request(url).unwrap();
        let decision = throttle
            .check_request(url, Some(Duration::from_secs(30)))
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("Minimum request delay not met"));
        assert!(decision.delay > Duration::from_secs(29));
    }

    #[test]
    fn test_crawl_delay_ignored_when_disabled() {
        let config = ThrottleConfig::new()
            .with_requests_per_second(10)
            .with_min_delay(Duration::ZERO)
            .ignore_crawl_delay();
        let throttle = DomainThrottle::new(config);
        let url = "https://a.test/";

        throttle.record_request(url).unwrap();
        let decision = throttle
            .check_request(url, Some(Duration::from_secs(30)))
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_second_window_resets_lazily() {
        let throttle = DomainThrottle::new(
            ThrottleConfig::new()
                .with_requests_per_second(1)
                .with_min_delay(Duration::ZERO),
        );
        let url = "https://a.test/";

        throttle.record_request(url).unwrap();
        assert!(!throttle.check_request(url, None).unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(throttle.check_request(url, None).unwrap().allowed);
        assert_eq!(throttle.snapshot(url).unwrap().unwrap().second_count, 0);
        // The hour window has not elapsed, so that counter survives.
        assert_eq!(throttle.snapshot(url).unwrap().unwrap().hour_count, 1);
    }

    #[test]
    fn test_success_resets_consecutive_errors() {
        let throttle = DomainThrottle::default();
        let url = "https://a.test/";

        throttle.record_error(url, FailureKind::Network).unwrap();
        throttle.record_error(url, FailureKind::Network).unwrap();
        throttle.record_request(url).unwrap();
        assert_eq!(
            throttle.snapshot(url).unwrap().unwrap().consecutive_errors,
            0
        );
    }

    #[test]
    fn test_cleanup_keeps_recent_and_blocked() {
        let throttle = DomainThrottle::default();
        throttle.record_request("https://a.test/").unwrap();
        for _ in 0..5 {
            throttle
                .record_error("https://b.test/", FailureKind::Server)
                .unwrap();
        }

        let removed = throttle.cleanup();
        assert_eq!(removed, 0);
        assert_eq!(throttle.domain_count(), 2);
    }

    #[tokio::test]
    async fn test_execute_routes_outcomes() {
        let throttle = DomainThrottle::new(
            ThrottleConfig::new()
                .with_requests_per_second(10)
                .with_min_delay(Duration::ZERO),
        );
        let url = "https://a.test/";

        let ok: Result<u32> = throttle.execute(url, None, None, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(throttle.snapshot(url).unwrap().unwrap().hour_count, 1);

        let err: Result<u32> = throttle
            .execute(url, None, None, || async {
                Err(FetchError::Status {
                    status: 503,
                    url: url.to_string(),
                })
            })
            .await;
        assert!(err.is_err());
        assert_eq!(
            throttle.snapshot(url).unwrap().unwrap().consecutive_errors,
            1
        );
    }

    #[tokio::test]
    async fn test_wait_for_request_cancellable() {
        let throttle = DomainThrottle::default();
        let url = "https://a.test/";
        for _ in 0..5 {
            throttle.record_error(url, FailureKind::Server).unwrap();
        }

        let token = CancellationToken::new();
        token.cancel();
        let result = throttle.wait_for_request(url, None, Some(&token)).await;
        assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    }
}
