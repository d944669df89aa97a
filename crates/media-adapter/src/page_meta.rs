//! Adapter that reads Open Graph media tags from a loaded page
//!
//! The page is loaded through the pool resource (so it goes out through that
//! slot's proxy), then `og:video*` and `og:image` meta tags are collected.
//! Videos win over images. With several video variants, `high` quality takes
//! the first listed and `low` the last.

use std::sync::LazyLock;

use browser_pool::{ExecutionContext, HttpBrowser, Interrupted};
use futures_util::future::BoxFuture;
use regex::Regex;
use tracing::{debug, info};

use crate::adapter::MediaAdapter;
use crate::error::{AdapterError, Result};
use crate::settings::{AdapterSettings, Quality};

// Quoted attribute values may contain '>'.
static META_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("meta tag pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// A resource that can load a page and return its HTML.
pub trait PageFetcher: Send {
    fn fetch_page<'a>(&'a mut self, url: &'a str, user_agent: &'a str)
    -> BoxFuture<'a, Result<String>>;
}

impl PageFetcher for HttpBrowser {
    fn fetch_page<'a>(
        &'a mut self,
        url: &'a str,
        user_agent: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.load_page(url, user_agent).await.map_err(AdapterError::from) })
    }
}

/// Open Graph media extractor, optionally restricted to a set of hosts.
#[derive(Debug, Clone, Default)]
pub struct PageMetaAdapter {
    hosts: Vec<String>,
    settings: AdapterSettings,
}

impl PageMetaAdapter {
    /// Accepts any `http(s)` page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts pages on `hosts` (and their subdomains) only.
    pub fn for_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
            settings: AdapterSettings::default(),
        }
    }

    fn host_allowed(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")))
    }
}

impl<R: PageFetcher + 'static> MediaAdapter<R> for PageMetaAdapter {
    fn name(&self) -> &str {
        "page-meta"
    }

    fn matches(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|h| self.host_allowed(h))
    }

    fn extract_direct_urls<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        resource: &'a mut R,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let timeout = self.settings.timeout();
            info!(slot = ctx.slot(), url, user_agent = self.settings.user_agent(), "opening page");

            let html = ctx
                .run(timeout, resource.fetch_page(url, self.settings.user_agent()))
                .await
                .map_err(|interrupted| match interrupted {
                    Interrupted::Cancelled => AdapterError::Cancelled,
                    Interrupted::TimedOut(d) => AdapterError::Timeout {
                        url: url.to_string(),
                        secs: d.as_secs(),
                    },
                })??;

            let media = extract_og_media(&html, self.settings.quality());
            debug!(url, found = media.len(), "page meta extracted");
            if media.is_empty() {
                return Err(AdapterError::NoMedia(url.to_string()));
            }
            Ok(media)
        })
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut AdapterSettings {
        &mut self.settings
    }
}

/// Collect Open Graph media URLs from `html`.
///
/// Returns a single video (picked by `quality`) when any video tag exists,
/// otherwise every distinct image.
pub fn extract_og_media(html: &str, quality: Quality) -> Vec<String> {
    let mut videos: Vec<String> = Vec::new();
    let mut images: Vec<String> = Vec::new();

    for tag in META_TAG.find_iter(html) {
        let mut property = None;
        let mut content = None;
        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
            match attr[1].to_ascii_lowercase().as_str() {
                "property" | "name" => property = value.map(str::to_ascii_lowercase),
                "content" => content = value.map(decode_entities),
                _ => {}
            }
        }

        let (Some(property), Some(content)) = (property, content) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        let bucket = match property.as_str() {
            "og:video" | "og:video:url" | "og:video:secure_url" => &mut videos,
            "og:image" | "og:image:url" | "og:image:secure_url" => &mut images,
            _ => continue,
        };
        if !bucket.contains(&content) {
            bucket.push(content);
        }
    }

    if !videos.is_empty() {
        let picked = match quality {
            Quality::High => videos.swap_remove(0),
            Quality::Low => videos.pop().unwrap_or_default(),
        };
        return vec![picked];
    }
    images
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
