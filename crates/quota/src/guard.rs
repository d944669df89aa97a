//! Serialized quota check-and-increment
//!
//! One lock covers the whole read-check-increment sequence, so two requests
//! for the same account can never both pass a check that only one of them
//! fits. The store transaction provides durability on top.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Feature, Usage, now_millis};
use crate::store::{QuotaStore, QuotaTx};

pub struct QuotaGuard {
    store: Arc<dyn QuotaStore>,
    default_plan: String,
    lock: Mutex<()>,
}

impl QuotaGuard {
    /// `default_plan` is assigned to accounts seen for the first time.
    pub fn new(store: Arc<dyn QuotaStore>, default_plan: impl Into<String>) -> Self {
        Self {
            store,
            default_plan: default_plan.into(),
            lock: Mutex::new(()),
        }
    }

    /// Check that `account_id` may consume `pending` units of `feature` and, if
    /// so, record them. Nothing is persisted on rejection.
    pub async fn check_and_increment(
        &self,
        account_id: i64,
        feature: Feature,
        pending: i64,
    ) -> Result<Usage> {
        self.check_and_increment_at(account_id, feature, pending, now_millis())
            .await
    }

    /// Same as `check_and_increment` with an explicit clock.
    pub async fn check_and_increment_at(
        &self,
        account_id: i64,
        feature: Feature,
        pending: i64,
        now: u64,
    ) -> Result<Usage> {
        let _serialized = self.lock.lock().await;

        let mut tx = self.store.begin().await?;
        match self.apply(tx.as_mut(), account_id, feature, pending, now).await {
            Ok(usage) => {
                tx.commit().await?;
                debug!(account_id, feature = %feature, usage = usage.usage, "quota usage recorded");
                Ok(usage)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(account_id, error = %rollback_err, "quota rollback failed");
                }
                info!(account_id, feature = %feature, error = %e, "quota check rejected");
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut (dyn QuotaTx + '_),
        account_id: i64,
        feature: Feature,
        pending: i64,
        now: u64,
    ) -> Result<Usage> {
        let subscription = match tx.active_subscription(account_id).await? {
            Some(subscription) => subscription,
            None => {
                info!(account_id, plan = %self.default_plan, "creating default subscription");
                tx.create_subscription(account_id, &self.default_plan, now)
                    .await?
            }
        };
        if subscription.is_expired(now) {
            return Err(Error::SubscriptionExpired);
        }

        let plan_feature = tx
            .plan_feature(&subscription.plan_id, feature)
            .await?
            .ok_or_else(|| Error::FeatureUnavailable {
                feature,
                plan: subscription.plan_id.clone(),
            })?;

        let mut usage = match tx.usage(account_id, feature).await? {
            Some(usage) => usage,
            None => tx.create_usage(account_id, feature, now).await?,
        };

        if plan_feature.window_elapsed(usage.reset_at, now) {
            debug!(
                account_id,
                feature = %feature,
                previous = usage.usage,
                "usage window elapsed, resetting"
            );
            usage.usage = 0;
            usage.reset_at = now;
        }

        if !plan_feature.is_unlimited() && usage.usage + pending > plan_feature.limit {
            return Err(Error::LimitExceeded {
                feature,
                limit: plan_feature.limit,
                usage: usage.usage,
            });
        }

        usage.usage += pending;
        tx.update_usage(&usage).await?;
        Ok(usage)
    }
}
