//! Error types for per-URL processing

use media_adapter::AdapterError;

/// Errors from one URL's processing. None of them escape the URL's task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] browser_pool::Error),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Quota(#[from] quota::Error),

    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("failed to download {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl Error {
    /// Whether the outer retry should run another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Adapter(e) => e.is_retryable(),
            Error::Pool(e) => matches!(
                e,
                browser_pool::Error::TaskPanicked(_) | browser_pool::Error::PageLoad { .. }
            ),
            Error::Download { .. } | Error::HttpStatus { .. } => true,
            Error::Quota(_) | Error::Delivery(_) => false,
        }
    }
}

/// Outcome of a retried operation that never succeeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every attempt failed; `last` is the final attempt's error.
    #[error("after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// A non-retryable error stopped the loop early.
    #[error("{error}")]
    Aborted { attempt: u32, error: E },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(Error::HttpStatus { url: "u".into(), status: 503 }.is_retryable());
        assert!(Error::Adapter(AdapterError::NoMedia("u".into())).is_retryable());
        assert!(!Error::Adapter(AdapterError::NotFound("u".into())).is_retryable());
        assert!(!Error::Quota(quota::Error::SubscriptionExpired).is_retryable());
        assert!(!Error::Pool(browser_pool::Error::Closed).is_retryable());
        assert!(Error::Pool(browser_pool::Error::TaskPanicked("x".into())).is_retryable());
    }

    #[test]
    fn exhausted_display_carries_attempt_count() {
        let err = RetryError::Exhausted {
            attempts: 3,
            last: Error::HttpStatus {
                url: "https://cdn/x.mp4".into(),
                status: 500,
            },
        };
        assert_eq!(
            err.to_string(),
            "after 3 attempts: failed to download https://cdn/x.mp4: HTTP 500"
        );
    }
}
