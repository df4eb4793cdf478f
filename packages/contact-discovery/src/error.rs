//! Typed errors for the discovery library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Every error maps to an
//! [`ErrorCategory`] whose retryability and recovery strategy are fixed
//! at classification time, never re-decided per call site.

use thiserror::Error;
use uuid::Uuid;

use crate::types::job::SearchStage;

/// Broad error categories shared across the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DatabaseConnection,
    DatabaseTimeout,
    Network,
    Authentication,
    Authorization,
    RateLimit,
    Validation,
    /// Catch-all for anything not matching a more specific category.
    Application,
}

impl ErrorCategory {
    /// Whether errors in this category are worth retrying.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::DatabaseConnection
                | ErrorCategory::DatabaseTimeout
                | ErrorCategory::Network
                | ErrorCategory::RateLimit
        )
    }

    /// Recovery strategy paired with this category.
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        if self.retryable() {
            RecoveryStrategy::RetryWithBackoff
        } else {
            RecoveryStrategy::UserActionRequired
        }
    }
}

/// How a caller should recover from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    RetryWithBackoff,
    UserActionRequired,
}

/// Failure buckets used by the throttler for logging/metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Server,
    Blocked,
}

/// Errors that can occur during discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Fetch or search call failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// AI collaborator unavailable or failed
    #[error("AI service error: {0}")]
    Ai(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Persistence operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Attempted stage transition the state machine forbids
    #[error("invalid stage transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SearchStage, to: SearchStage },

    /// Job not found in the store
    #[error("search job not found: {search_id}")]
    JobNotFound { search_id: Uuid },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// A pipeline stage exceeded its timeout
    #[error("stage timed out: {stage:?}")]
    StageTimeout { stage: SearchStage },

    /// The whole search exceeded its ceiling
    #[error("search timed out after {elapsed_ms}ms")]
    TotalTimeout { elapsed_ms: u64 },

    /// Invalid configuration supplied
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Retries exhausted without success
    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Every source failed; nothing usable was gathered
    #[error("no usable results: {reason}")]
    NoUsableResults { reason: String },
}

impl DiscoveryError {
    /// Category for this error, assigned once here.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DiscoveryError::Fetch(e) => e.category(),
            DiscoveryError::Ai(_) => ErrorCategory::Network,
            DiscoveryError::Storage(_) => ErrorCategory::DatabaseConnection,
            DiscoveryError::InvalidTransition { .. } => ErrorCategory::Application,
            DiscoveryError::JobNotFound { .. } => ErrorCategory::Validation,
            DiscoveryError::Cancelled => ErrorCategory::Application,
            DiscoveryError::StageTimeout { .. } => ErrorCategory::Network,
            DiscoveryError::TotalTimeout { .. } => ErrorCategory::Application,
            DiscoveryError::InvalidConfig { .. } => ErrorCategory::Validation,
            DiscoveryError::RetriesExhausted { .. } => ErrorCategory::Network,
            DiscoveryError::NoUsableResults { .. } => ErrorCategory::Application,
        }
    }

    /// Whether this error is worth retrying.
    pub fn retryable(&self) -> bool {
        match self {
            // Exhausted retries and cancellation are terminal regardless of category.
            DiscoveryError::RetriesExhausted { .. } | DiscoveryError::Cancelled => false,
            other => other.category().retryable(),
        }
    }

    /// Recovery strategy for callers.
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        if self.retryable() {
            RecoveryStrategy::RetryWithBackoff
        } else {
            RecoveryStrategy::UserActionRequired
        }
    }
}

/// Errors raised by search/fetch collaborators.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    /// Transport-level failure (DNS, connect, TLS, body read)
    #[error("request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Denied by the throttler
    #[error("rate limited: retry after {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    /// URL could not be parsed or has no host
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Request exceeded its deadline
    #[error("timeout fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    /// Category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::Status { status, .. } => match *status {
                401 => ErrorCategory::Authentication,
                403 => ErrorCategory::Authorization,
                429 => ErrorCategory::RateLimit,
                400..=499 => ErrorCategory::Validation,
                _ => ErrorCategory::Network,
            },
            FetchError::Transport(_) => ErrorCategory::Network,
            FetchError::Throttled { .. } => ErrorCategory::RateLimit,
            FetchError::InvalidUrl { .. } => ErrorCategory::Validation,
            FetchError::Timeout { .. } => ErrorCategory::Network,
        }
    }

    /// Whether the failure is transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            // 429 is the one client status worth retrying.
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Transport(_) => true,
            FetchError::Throttled { .. } => true,
            FetchError::InvalidUrl { .. } => false,
            FetchError::Timeout { .. } => true,
        }
    }

    /// Bucket this failure for throttler bookkeeping.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::Status { status, .. } => classify_failure(Some(*status), ""),
            FetchError::Throttled { .. } => FailureKind::Blocked,
            _ => FailureKind::Network,
        }
    }
}

/// Bucket a failure by HTTP status and/or message text.
///
/// Status takes precedence; message sniffing is the fallback for
/// collaborators that only surface strings.
pub fn classify_failure(status: Option<u16>, message: &str) -> FailureKind {
    if let Some(status) = status {
        if status >= 500 {
            return FailureKind::Server;
        }
        if status == 429 || status == 403 {
            return FailureKind::Blocked;
        }
        return FailureKind::Network;
    }

    let message = message.to_lowercase();
    if message.contains("429") || message.contains("403") || message.contains("forbidden") {
        FailureKind::Blocked
    } else if message.contains("500")
        || message.contains("502")
        || message.contains("503")
        || message.contains("internal server")
    {
        FailureKind::Server
    } else {
        FailureKind::Network
    }
}

/// Default retryability check over message text.
///
/// Used by the retry mechanism when an operation surfaces opaque errors:
/// network/timeout/5xx/429/overload markers are retryable, other 4xx are
/// not, unknown errors default to retryable.
pub fn message_is_retryable(message: &str) -> bool {
    let message = message.to_lowercase();

    for marker in [
        "timeout",
        "timed out",
        "econnrefused",
        "econnreset",
        "network",
        "connection",
        "overloaded",
        "429",
        "500",
        "502",
        "503",
        "504",
    ] {
        if message.contains(marker) {
            return true;
        }
    }

    // Any other 4xx-looking status is a caller problem.
    for status in 400..500u16 {
        if status != 429 && message.contains(&status.to_string()) {
            return false;
        }
    }

    true
}

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_retryability_is_fixed() {
        assert!(ErrorCategory::Network.retryable());
        assert!(ErrorCategory::RateLimit.retryable());
        assert!(!ErrorCategory::Validation.retryable());
        assert!(!ErrorCategory::Authentication.retryable());

        assert_eq!(
            ErrorCategory::Network.recovery_strategy(),
            RecoveryStrategy::RetryWithBackoff
        );
        assert_eq!(
            ErrorCategory::Authorization.recovery_strategy(),
            RecoveryStrategy::UserActionRequired
        );
    }

    #[test]
    fn test_fetch_error_classification() {
        let server = FetchError::Status {
            status: 503,
            url: "https://a.test".into(),
        };
        assert!(server.is_retryable());
        assert_eq!(server.failure_kind(), FailureKind::Server);

        let not_found = FetchError::Status {
            status: 404,
            url: "https://a.test".into(),
        };
        assert!(!not_found.is_retryable());
        assert_eq!(not_found.failure_kind(), FailureKind::Network);

        let limited = FetchError::Status {
            status: 429,
            url: "https://a.test".into(),
        };
        assert!(limited.is_retryable());
        assert_eq!(limited.failure_kind(), FailureKind::Blocked);
        assert_eq!(limited.category(), ErrorCategory::RateLimit);
    }

    #[test]
    fn test_message_classification() {
        assert!(message_is_retryable("ECONNREFUSED"));
        assert!(message_is_retryable("request timed out"));
        assert!(message_is_retryable("HTTP 429 too many requests"));
        assert!(message_is_retryable("model overloaded"));
        assert!(!message_is_retryable("HTTP 404 not found"));
        assert!(!message_is_retryable("400 bad request"));
        // Unknown errors default to retryable.
        assert!(message_is_retryable("something odd happened"));
    }

    #[test]
    fn test_exhausted_retries_not_retryable() {
        let err = DiscoveryError::RetriesExhausted {
            attempts: 3,
            message: "connection reset".into(),
        };
        assert!(!err.retryable());
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::UserActionRequired);
    }
}
