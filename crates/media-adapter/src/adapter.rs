//! Media adapter capability
//!
//! An adapter knows one content source: which page URLs it accepts and how to
//! turn such a page into direct media URLs using a pool resource. The pipeline
//! never looks inside an adapter; it only uses this contract.
//!
//! Extraction returns `BoxFuture` (rather than `async fn`) so adapters can be
//! stored as `Arc<dyn MediaAdapter<R>>` in the registry.

use std::time::Duration;

use browser_pool::ExecutionContext;
use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::filename::{MediaKind, filename_from_url};
use crate::settings::{AdapterSettings, Quality};

/// Capability implemented per content source, generic over the pool resource `R`.
pub trait MediaAdapter<R>: Send + Sync {
    /// Short identifier for logs and metrics (e.g. "page-meta").
    fn name(&self) -> &str;

    /// Whether this adapter can handle `url`.
    fn matches(&self, url: &str) -> bool;

    /// Resolve `url` into one or more direct media URLs.
    ///
    /// Runs on a pool worker with exclusive access to `resource`. Implementations
    /// should observe `ctx` cancellation and their own timeout.
    fn extract_direct_urls<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        resource: &'a mut R,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>>>;

    fn settings(&self) -> &AdapterSettings;

    fn settings_mut(&mut self) -> &mut AdapterSettings;

    /// Filename for the item at `index` downloaded from `direct_url`.
    fn build_filename(&self, _original_url: &str, direct_url: &str, index: usize) -> String {
        let kind = MediaKind::from_filename(direct_url.split('?').next().unwrap_or(direct_url));
        filename_from_url(direct_url, index, kind)
    }

    fn user_agent(&self) -> &str {
        self.settings().user_agent()
    }

    fn quality(&self) -> Quality {
        self.settings().quality()
    }

    fn timeout(&self) -> Duration {
        self.settings().timeout()
    }

    fn set_quality(&mut self, quality: &str) {
        self.settings_mut().set_quality(quality);
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.settings_mut().set_timeout(timeout);
    }

    fn set_user_agent(&mut self, user_agent: &str) {
        self.settings_mut().set_user_agent(user_agent);
    }
}
