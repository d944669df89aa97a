//! JSON-file-backed quota store
//!
//! Subscriptions and usage counters live in one JSON file; plans come from
//! configuration and are never persisted. A transaction holds the store lock
//! for its whole lifetime and works on a copy of the state, so an uncommitted
//! transaction never leaks partial writes. Commit persists with an atomic
//! temp-file + rename before swapping the copy in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Feature, Plan, PlanFeature, Subscription, SubscriptionStatus, Usage};
use crate::store::{QuotaStore, QuotaTx, StoreFuture};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct QuotaState {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
    #[serde(default)]
    usages: Vec<Usage>,
}

impl QuotaState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct FileQuotaStore {
    path: Option<PathBuf>,
    plans: Vec<Plan>,
    state: Mutex<QuotaState>,
}

impl FileQuotaStore {
    /// Load state from `path`, creating an empty file on cold start.
    pub async fn load(path: PathBuf, plans: Vec<Plan>) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Store(format!("reading quota file: {e}")))?;
            let state: QuotaState = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing quota file: {e}")))?;
            info!(
                path = %path.display(),
                subscriptions = state.subscriptions.len(),
                usages = state.usages.len(),
                "loaded quota state"
            );
            state
        } else {
            info!(path = %path.display(), "quota file not found, starting with empty state");
            let state = QuotaState::default();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path: Some(path),
            plans,
            state: Mutex::new(state),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory(plans: Vec<Plan>) -> Self {
        Self {
            path: None,
            plans,
            state: Mutex::new(QuotaState::default()),
        }
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

impl QuotaStore for FileQuotaStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn QuotaTx + '_>> {
        Box::pin(async move {
            let guard = self.state.lock().await;
            let working = guard.clone();
            let tx: Box<dyn QuotaTx + '_> = Box::new(FileTx {
                guard,
                working,
                plans: &self.plans,
                path: self.path.as_deref(),
            });
            Ok(tx)
        })
    }
}

struct FileTx<'s> {
    guard: MutexGuard<'s, QuotaState>,
    working: QuotaState,
    plans: &'s [Plan],
    path: Option<&'s Path>,
}

impl QuotaTx for FileTx<'_> {
    fn active_subscription(&mut self, account_id: i64) -> StoreFuture<'_, Option<Subscription>> {
        let found = self
            .working
            .subscriptions
            .iter()
            .find(|s| s.account_id == account_id && s.status == SubscriptionStatus::Active)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn create_subscription<'a>(
        &'a mut self,
        account_id: i64,
        plan_id: &'a str,
        start: u64,
    ) -> StoreFuture<'a, Subscription> {
        let subscription = Subscription {
            id: self.working.allocate_id(),
            account_id,
            plan_id: plan_id.to_string(),
            status: SubscriptionStatus::Active,
            start,
            end: None,
        };
        self.working.subscriptions.push(subscription.clone());
        Box::pin(async move { Ok(subscription) })
    }

    fn plan_feature<'a>(
        &'a mut self,
        plan_id: &'a str,
        feature: Feature,
    ) -> StoreFuture<'a, Option<PlanFeature>> {
        let found = self
            .plans
            .iter()
            .find(|p| p.id == plan_id)
            .and_then(|p| p.feature(feature))
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn usage(&mut self, account_id: i64, feature: Feature) -> StoreFuture<'_, Option<Usage>> {
        let found = self
            .working
            .usages
            .iter()
            .find(|u| u.account_id == account_id && u.feature == feature)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn create_usage(
        &mut self,
        account_id: i64,
        feature: Feature,
        now: u64,
    ) -> StoreFuture<'_, Usage> {
        let usage = Usage {
            id: self.working.allocate_id(),
            account_id,
            feature,
            usage: 0,
            reset_at: now,
        };
        self.working.usages.push(usage.clone());
        Box::pin(async move { Ok(usage) })
    }

    fn update_usage<'a>(&'a mut self, usage: &'a Usage) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let slot = self
                .working
                .usages
                .iter_mut()
                .find(|u| u.id == usage.id)
                .ok_or_else(|| Error::Store(format!("usage {} not found", usage.id)))?;
            *slot = usage.clone();
            Ok(())
        })
    }

    fn commit<'a>(self: Box<Self>) -> StoreFuture<'a, ()>
    where
        Self: 'a,
    {
        Box::pin(async move {
            let FileTx {
                mut guard,
                working,
                path,
                ..
            } = *self;
            if let Some(path) = path {
                write_atomic(path, &working).await?;
            }
            *guard = working;
            Ok(())
        })
    }

    fn rollback<'a>(self: Box<Self>) -> StoreFuture<'a, ()>
    where
        Self: 'a,
    {
        debug!("quota transaction rolled back");
        drop(self);
        Box::pin(async { Ok(()) })
    }
}

/// Write the state atomically (temp file in the same directory, then rename).
async fn write_atomic(path: &Path, state: &QuotaState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Store(format!("serializing quota state: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".quota.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp quota file: {e}")))?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp quota file: {e}")))?;

    debug!(path = %path.display(), "persisted quota state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plans() -> Vec<Plan> {
        vec![Plan {
            id: "free".into(),
            features: vec![PlanFeature {
                feature: Feature::GetMedia,
                limit: 5,
                days_to_reset: 1,
            }],
        }]
    }

    #[tokio::test]
    async fn cold_start_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");
        let _store = FileQuotaStore::load(path.clone(), plans()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["subscriptions"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn committed_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");
        {
            let store = FileQuotaStore::load(path.clone(), plans()).await.unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.create_subscription(42, "free", 1_000).await.unwrap();
            let mut usage = tx.create_usage(42, Feature::GetMedia, 1_000).await.unwrap();
            usage.usage = 3;
            tx.update_usage(&usage).await.unwrap();
            tx.commit().await.unwrap();
        }

        let store = FileQuotaStore::load(path, plans()).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let sub = tx.active_subscription(42).await.unwrap().unwrap();
        assert_eq!(sub.plan_id, "free");
        let usage = tx.usage(42, Feature::GetMedia).await.unwrap().unwrap();
        assert_eq!(usage.usage, 3);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = FileQuotaStore::in_memory(plans());

        let mut tx = store.begin().await.unwrap();
        tx.create_subscription(1, "free", 0).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.active_subscription(1).await.unwrap().is_none());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn plan_feature_lookup() {
        let store = FileQuotaStore::in_memory(plans());
        let mut tx = store.begin().await.unwrap();
        let pf = tx.plan_feature("free", Feature::GetMedia).await.unwrap().unwrap();
        assert_eq!(pf.limit, 5);
        assert!(tx.plan_feature("pro", Feature::GetMedia).await.unwrap().is_none());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn updating_unknown_usage_errors() {
        let store = FileQuotaStore::in_memory(plans());
        let mut tx = store.begin().await.unwrap();
        let ghost = Usage {
            id: 99,
            account_id: 1,
            feature: Feature::GetMedia,
            usage: 1,
            reset_at: 0,
        };
        assert!(matches!(tx.update_usage(&ghost).await, Err(Error::Store(_))));
    }
}
