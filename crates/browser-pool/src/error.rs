//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid pool config: {0}")]
    InvalidConfig(String),

    #[error("resource pool is closed")]
    Closed,

    #[error("resource pool is shutting down")]
    Cancelled,

    #[error("panic recovered in pool task: {0}")]
    TaskPanicked(String),

    #[error("pool worker exited before the task completed")]
    WorkerGone,

    #[error("failed to create resource {slot}: {message}")]
    ResourceInit { slot: usize, message: String },

    #[error("errors releasing resources: {}", .0.join("; "))]
    Release(Vec<String>),

    #[error("invalid proxy {proxy:?}: {reason}")]
    InvalidProxy { proxy: String, reason: String },

    #[error("failed to load page {url}: {message}")]
    PageLoad { url: String, message: String },
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_errors_are_joined() {
        let err = Error::Release(vec!["slot 0: boom".into(), "slot 2: gone".into()]);
        assert_eq!(
            err.to_string(),
            "errors releasing resources: slot 0: boom; slot 2: gone"
        );
    }

    #[test]
    fn resource_init_names_slot() {
        let err = Error::ResourceInit {
            slot: 3,
            message: "chrome not found".into(),
        };
        assert!(err.to_string().contains("resource 3"));
    }
}
