//! Per-URL processing context and inbound URL extraction

use crate::messenger::{ChatRef, MessageRef};

/// Everything a URL's task needs to report back to its chat.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub account_id: i64,
    pub chat: ChatRef,
    /// 0-based position among the URLs of the inbound message.
    pub index: usize,
    pub url: String,
    /// Status message, set once the initial status has been sent.
    pub status: Option<MessageRef>,
}

impl ProcessingContext {
    pub fn new(account_id: i64, chat: ChatRef, index: usize, url: String) -> Self {
        Self {
            account_id,
            chat,
            index,
            url,
            status: None,
        }
    }
}

/// Every line of `text` that starts with `http://` or `https://`, trimmed.
pub fn extract_urls(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(str::to_string)
        .collect()
}
