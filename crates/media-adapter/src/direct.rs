//! Adapter for URLs that already point at a media file

use browser_pool::ExecutionContext;
use futures_util::future::BoxFuture;

use crate::adapter::MediaAdapter;
use crate::error::Result;
use crate::filename::has_media_extension;
use crate::settings::AdapterSettings;

/// Accepts `http(s)` URLs whose path ends in a photo or video extension and
/// returns them unchanged. Never touches the pool resource.
#[derive(Debug, Clone, Default)]
pub struct DirectAdapter {
    settings: AdapterSettings,
}

impl DirectAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Send + 'static> MediaAdapter<R> for DirectAdapter {
    fn name(&self) -> &str {
        "direct"
    }

    fn matches(&self, url: &str) -> bool {
        match url::Url::parse(url) {
            Ok(parsed) => {
                matches!(parsed.scheme(), "http" | "https") && has_media_extension(&parsed)
            }
            Err(_) => false,
        }
    }

    fn extract_direct_urls<'a>(
        &'a self,
        _ctx: &'a ExecutionContext,
        _resource: &'a mut R,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move { Ok(vec![url.to_string()]) })
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut AdapterSettings {
        &mut self.settings
    }
}
