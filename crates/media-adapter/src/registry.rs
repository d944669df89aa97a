//! Ordered adapter registry
//!
//! Adapters are probed in registration order and the first match wins, so
//! selection is deterministic when several adapters accept the same URL.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::adapter::MediaAdapter;
use crate::error::{AdapterError, Result};

pub struct AdapterRegistry<R> {
    adapters: Vec<Arc<dyn MediaAdapter<R>>>,
    quality: Option<String>,
    timeout: Option<Duration>,
}

impl<R> Default for AdapterRegistry<R> {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            quality: None,
            timeout: None,
        }
    }
}

impl<R: 'static> AdapterRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quality and timeout applied to every adapter registered afterwards.
    pub fn with_defaults(quality: &str, timeout: Duration) -> Self {
        Self {
            adapters: Vec::new(),
            quality: Some(quality.to_string()),
            timeout: Some(timeout),
        }
    }

    pub fn register<A>(&mut self, mut adapter: A) -> &mut Self
    where
        A: MediaAdapter<R> + 'static,
    {
        if let Some(quality) = &self.quality {
            adapter.set_quality(quality);
        }
        if let Some(timeout) = self.timeout {
            adapter.set_timeout(timeout);
        }
        debug!(
            adapter = adapter.name(),
            position = self.adapters.len(),
            "adapter registered"
        );
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// First registered adapter that accepts `url`.
    pub fn select(&self, url: &str) -> Result<Arc<dyn MediaAdapter<R>>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.matches(url))
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(url.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
