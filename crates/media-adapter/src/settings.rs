//! Per-adapter settings with validating setters
//!
//! Invalid values never fail: they are logged and replaced by the default,
//! so a bad config entry degrades to stock behavior instead of refusing to start.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Which variant to pick when a page lists several renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    High,
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Quality::Low),
            "high" => Ok(Quality::High),
            other => Err(format!("unknown quality {other:?}, expected \"low\" or \"high\"")),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Low => "low",
            Quality::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    quality: Quality,
    timeout: Duration,
    user_agent: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            quality: Quality::High,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AdapterSettings {
    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Parse and apply a quality name; unknown names fall back to `high`.
    pub fn set_quality(&mut self, raw: &str) {
        self.quality = raw.parse().unwrap_or_else(|e| {
            warn!(quality = raw, error = %e, "invalid quality, defaulting to high");
            Quality::High
        });
    }

    /// Zero falls back to the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        if timeout.is_zero() {
            warn!(
                default_secs = DEFAULT_TIMEOUT.as_secs(),
                "invalid timeout, using default"
            );
            self.timeout = DEFAULT_TIMEOUT;
        } else {
            self.timeout = timeout;
        }
    }

    /// Empty strings fall back to the default user agent.
    pub fn set_user_agent(&mut self, user_agent: &str) {
        if user_agent.trim().is_empty() {
            warn!("user agent is empty, using default user agent");
            self.user_agent = DEFAULT_USER_AGENT.to_string();
        } else {
            self.user_agent = user_agent.to_string();
        }
    }
}
