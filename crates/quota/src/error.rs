//! Error types for quota checks and quota storage

use crate::model::Feature;

/// Errors from quota checks. Every variant is terminal for the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("subscription has expired")]
    SubscriptionExpired,

    #[error("feature limit exceeded: {feature} allows {limit}, {usage} already used")]
    LimitExceeded {
        feature: Feature,
        limit: i64,
        usage: i64,
    },

    #[error("feature {feature} is not available in plan {plan}")]
    FeatureUnavailable { feature: Feature, plan: String },

    #[error("quota store error: {0}")]
    Store(String),
}

/// Result alias for quota operations.
pub type Result<T> = std::result::Result<T, Error>;
