//! Direct-URL size probing and streaming downloads

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use media_adapter::filename::parse_content_disposition;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap,
    HeaderValue, USER_AGENT,
};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::media::ByteStream;

const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9,ru;q=0.8";

/// An open download whose body has not been read yet.
pub struct Download {
    pub stream: ByteStream,
    /// `Content-Length` of the response, 0 when absent.
    pub content_length: u64,
    /// Filename from `Content-Disposition`, when the server sent one.
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(request_timeout)
            .build()
            .map_err(|e| Error::Download {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Best-effort size in bytes; 0 when unknown.
    ///
    /// Tries HEAD first and falls back to the `Content-Length` of a GET whose
    /// body is never read.
    pub async fn probe_size(&self, url: &str, user_agent: &str) -> u64 {
        let head = self
            .client
            .head(url)
            .headers(identity_headers(user_agent))
            .send()
            .await;
        if let Ok(resp) = head
            && resp.status().is_success()
            && let Some(size) = content_length(resp.headers())
        {
            return size;
        }

        match self
            .client
            .get(url)
            .headers(identity_headers(user_agent))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => content_length(resp.headers()).unwrap_or(0),
            Ok(resp) => {
                debug!(url, status = resp.status().as_u16(), "size probe failed");
                0
            }
            Err(e) => {
                debug!(url, error = %e, "size probe failed");
                0
            }
        }
    }

    /// Start downloading `url`. Non-2xx statuses and transport errors fail.
    pub async fn fetch(&self, url: &str, user_agent: &str) -> Result<Download> {
        info!(url, user_agent, "downloading media");
        let resp = self
            .client
            .get(url)
            .headers(identity_headers(user_agent))
            .send()
            .await
            .map_err(|e| Error::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = content_length(resp.headers()).unwrap_or(0);
        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);

        let stream = resp
            .bytes_stream()
            .map(|chunk| -> std::io::Result<Bytes> {
                let chunk = chunk.map_err(std::io::Error::other)?;
                metrics::counter!("media_download_bytes_total").increment(chunk.len() as u64);
                Ok(chunk)
            })
            .boxed();

        Ok(Download {
            stream,
            content_length,
            filename,
        })
    }
}

fn identity_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|size| *size > 0)
}
