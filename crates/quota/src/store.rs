//! Quota storage contract
//!
//! The guard drives every read and write through a `QuotaTx` obtained from
//! `QuotaStore::begin`, then commits or rolls back. Methods return boxed futures
//! so stores can be used as `dyn QuotaStore`.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::model::{Feature, PlanFeature, Subscription, Usage};

/// Boxed future returned by store and transaction methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait QuotaStore: Send + Sync {
    fn begin(&self) -> StoreFuture<'_, Box<dyn QuotaTx + '_>>;
}

/// One transaction. Nothing is visible to other transactions until `commit`.
pub trait QuotaTx: Send {
    fn active_subscription(&mut self, account_id: i64) -> StoreFuture<'_, Option<Subscription>>;

    fn create_subscription<'a>(
        &'a mut self,
        account_id: i64,
        plan_id: &'a str,
        start: u64,
    ) -> StoreFuture<'a, Subscription>;

    fn plan_feature<'a>(
        &'a mut self,
        plan_id: &'a str,
        feature: Feature,
    ) -> StoreFuture<'a, Option<PlanFeature>>;

    fn usage(&mut self, account_id: i64, feature: Feature) -> StoreFuture<'_, Option<Usage>>;

    /// Create a zero counter whose window starts at `now`.
    fn create_usage(&mut self, account_id: i64, feature: Feature, now: u64)
    -> StoreFuture<'_, Usage>;

    fn update_usage<'a>(&'a mut self, usage: &'a Usage) -> StoreFuture<'a, ()>;

    fn commit<'a>(self: Box<Self>) -> StoreFuture<'a, ()>
    where
        Self: 'a;

    fn rollback<'a>(self: Box<Self>) -> StoreFuture<'a, ()>
    where
        Self: 'a;
}
