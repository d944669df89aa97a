//! Service-specific error types

use thiserror::Error;

/// Startup wiring errors. Per-URL failures never reach this type; they end
/// as status messages inside the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to start resource pool: {0}")]
    Pool(#[from] browser_pool::Error),

    #[error("failed to open quota store: {0}")]
    Quota(#[from] quota::Error),

    #[error("failed to build pipeline: {0}")]
    Pipeline(#[from] media_pipeline::Error),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
