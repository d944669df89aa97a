//! Error types for adapter selection and extraction

/// Errors from adapter selection and direct-URL extraction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("no adapter found for {0}")]
    NotFound(String),

    #[error("failed to extract media from {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("no media found at {0}")]
    NoMedia(String),

    #[error("timed out after {secs}s extracting media from {url}")]
    Timeout { url: String, secs: u64 },

    #[error("extraction cancelled: pool is shutting down")]
    Cancelled,

    #[error("failed to load page {url}: {message}")]
    PageLoad { url: String, message: String },
}

impl AdapterError {
    /// Whether another attempt at the same URL could succeed.
    ///
    /// A missing adapter or a shutdown will not change between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AdapterError::NotFound(_) | AdapterError::Cancelled)
    }
}

impl From<browser_pool::Error> for AdapterError {
    fn from(err: browser_pool::Error) -> Self {
        match err {
            browser_pool::Error::PageLoad { url, message } => {
                AdapterError::PageLoad { url, message }
            }
            browser_pool::Error::Cancelled | browser_pool::Error::Closed => AdapterError::Cancelled,
            other => AdapterError::Extraction {
                url: String::new(),
                message: other.to_string(),
            },
        }
    }
}

/// Result alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
