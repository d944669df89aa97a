//! Quota entities: plans, subscriptions and usage counters
//!
//! Timestamps are unix milliseconds, matching how the rest of the workspace
//! stores absolute times.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// A metered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    GetMedia,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::GetMedia => "get_media",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get_media" => Ok(Feature::GetMedia),
            other => Err(format!("unknown feature {other:?}")),
        }
    }
}

/// Limit granted by a plan for one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeature {
    pub feature: Feature,
    /// Maximum usage per window; zero or negative means unlimited.
    pub limit: i64,
    /// Rolling window length in days; zero means the counter never resets.
    #[serde(default)]
    pub days_to_reset: u32,
}

impl PlanFeature {
    pub fn is_unlimited(&self) -> bool {
        self.limit <= 0
    }

    /// Whether the window that started at `reset_at` has elapsed by `now`.
    pub fn window_elapsed(&self, reset_at: u64, now: u64) -> bool {
        let window = u64::from(self.days_to_reset).saturating_mul(MILLIS_PER_DAY);
        self.days_to_reset > 0 && reset_at.saturating_add(window) < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub features: Vec<PlanFeature>,
}

impl Plan {
    pub fn feature(&self, feature: Feature) -> Option<&PlanFeature> {
        self.features.iter().find(|f| f.feature == feature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub account_id: i64,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start: u64,
    /// Open-ended when absent.
    #[serde(default)]
    pub end: Option<u64>,
}

impl Subscription {
    pub fn is_expired(&self, now: u64) -> bool {
        self.end.is_some_and(|end| end < now)
    }
}

/// Per-account, per-feature usage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub id: u64,
    pub account_id: i64,
    pub feature: Feature,
    pub usage: i64,
    /// Start of the current window.
    pub reset_at: u64,
}

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
