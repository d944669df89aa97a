//! Messaging collaborator contract
//!
//! The pipeline reports progress and delivers media only through this trait.
//! Methods return `BoxFuture` so the processor can hold an `Arc<dyn Messenger>`.

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::media::MediaItem;

/// The inbound message being answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// A status message previously sent by the messenger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub id: String,
}

pub trait Messenger: Send + Sync {
    /// Send a status message as a reply to `chat` and return its handle.
    fn send_status<'a>(
        &'a self,
        chat: &'a ChatRef,
        text: &'a str,
    ) -> BoxFuture<'a, Result<MessageRef>>;

    fn edit_status<'a>(
        &'a self,
        message: &'a MessageRef,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn delete_status<'a>(&'a self, message: &'a MessageRef) -> BoxFuture<'a, Result<()>>;

    /// Send a plain reply that is not tracked as a status message.
    fn send_reply<'a>(&'a self, chat: &'a ChatRef, text: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Deliver one group of media. Consumes the items and their streams.
    fn send_media_batch<'a>(
        &'a self,
        chat: &'a ChatRef,
        items: Vec<MediaItem>,
        caption: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}
