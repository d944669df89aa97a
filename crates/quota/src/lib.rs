//! Per-account usage quotas
//!
//! `QuotaGuard::check_and_increment` runs the whole admission sequence under a
//! single lock and inside one store transaction:
//! 1. Find the account's active subscription, creating one on the default
//!    plan if none exists
//! 2. Reject if it has expired
//! 3. Look up the plan's limit for the feature (reject if the plan lacks it)
//! 4. Find or create the usage counter, resetting it if its window elapsed
//! 5. Reject if `usage + pending` exceeds a positive limit
//! 6. Persist the incremented counter and commit

pub mod error;
pub mod file_store;
pub mod guard;
pub mod model;
pub mod store;

pub use error::{Error, Result};
pub use file_store::FileQuotaStore;
pub use guard::QuotaGuard;
pub use model::{Feature, Plan, PlanFeature, Subscription, SubscriptionStatus, Usage};
pub use store::{QuotaStore, QuotaTx, StoreFuture};
