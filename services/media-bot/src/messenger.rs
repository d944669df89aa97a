//! Filesystem-backed messenger
//!
//! Status messages live in memory and are logged on every change. Each media
//! batch gets its own directory, `output_dir/<chat_id>/<message_id>/<batch>/`,
//! numbered from 1 per inbound message, holding the items and a `caption.txt`.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use media_pipeline::{ChatRef, Error, MediaItem, MessageRef, Messenger, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct FsMessenger {
    output_dir: PathBuf,
    statuses: Mutex<HashMap<String, String>>,
    /// Batches delivered so far per (chat, inbound message).
    batches: Mutex<HashMap<(i64, i64), u64>>,
}

impl FsMessenger {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            statuses: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Current text of a status message, if it has not been deleted.
    pub async fn status(&self, id: &str) -> Option<String> {
        self.statuses.lock().await.get(id).cloned()
    }

    /// Reserve the next batch directory for this inbound message. URLs of one
    /// message and the groups of one URL never share a directory.
    async fn next_batch_dir(&self, chat: &ChatRef) -> PathBuf {
        let batch = {
            let mut batches = self.batches.lock().await;
            let counter = batches.entry((chat.chat_id, chat.message_id)).or_insert(0);
            *counter += 1;
            *counter
        };
        self.output_dir
            .join(chat.chat_id.to_string())
            .join(chat.message_id.to_string())
            .join(batch.to_string())
    }
}

impl Messenger for FsMessenger {
    fn send_status<'a>(
        &'a self,
        chat: &'a ChatRef,
        text: &'a str,
    ) -> BoxFuture<'a, Result<MessageRef>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().as_simple().to_string();
            self.statuses.lock().await.insert(id.clone(), text.to_string());
            info!(
                chat_id = chat.chat_id,
                reply_to = chat.message_id,
                status_id = %id,
                text,
                "status sent"
            );
            Ok(MessageRef {
                chat_id: chat.chat_id,
                id,
            })
        })
    }

    fn edit_status<'a>(
        &'a self,
        message: &'a MessageRef,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut statuses = self.statuses.lock().await;
            let Some(current) = statuses.get_mut(&message.id) else {
                return Err(Error::Delivery(format!("unknown status message {}", message.id)));
            };
            if current == text {
                debug!(status_id = %message.id, "status unchanged");
                return Ok(());
            }
            *current = text.to_string();
            info!(chat_id = message.chat_id, status_id = %message.id, text, "status edited");
            Ok(())
        })
    }

    fn delete_status<'a>(&'a self, message: &'a MessageRef) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.statuses.lock().await.remove(&message.id).is_none() {
                return Err(Error::Delivery(format!("unknown status message {}", message.id)));
            }
            info!(chat_id = message.chat_id, status_id = %message.id, "status deleted");
            Ok(())
        })
    }

    fn send_reply<'a>(&'a self, chat: &'a ChatRef, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(chat_id = chat.chat_id, reply_to = chat.message_id, text, "reply sent");
            Ok(())
        })
    }

    fn send_media_batch<'a>(
        &'a self,
        chat: &'a ChatRef,
        items: Vec<MediaItem>,
        caption: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dir = self.next_batch_dir(chat).await;
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| io_error(&dir, e))?;

            let count = items.len();
            let mut total = 0u64;
            let mut taken = HashSet::new();
            for item in items {
                total += write_item(&dir, item, &mut taken).await?;
            }

            let caption_path = dir.join("caption.txt");
            tokio::fs::write(&caption_path, caption)
                .await
                .map_err(|e| io_error(&caption_path, e))?;

            info!(
                chat_id = chat.chat_id,
                dir = %dir.display(),
                count,
                bytes = total,
                "media batch delivered"
            );
            Ok(())
        })
    }
}

/// Stream one item to `dir` and return the number of bytes written.
///
/// `taken` holds the names already used in this batch; a repeated name gets a
/// `-2`, `-3`... suffix before its extension.
async fn write_item(dir: &Path, item: MediaItem, taken: &mut HashSet<OsString>) -> Result<u64> {
    // Adapter filenames are already sanitized; keep only the last component anyway.
    let name = Path::new(&item.filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "media.bin".into());
    let path = dir.join(unique_name(name, taken));

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| io_error(&path, e))?;
    let mut stream = item.stream;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| Error::Delivery(format!("failed to read {}: {e}", item.direct_url)))?;
        file.write_all(&chunk).await.map_err(|e| io_error(&path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| io_error(&path, e))?;

    debug!(path = %path.display(), kind = ?item.kind, bytes = written, "media item written");
    Ok(written)
}

fn unique_name(name: OsString, taken: &mut HashSet<OsString>) -> OsString {
    if taken.insert(name.clone()) {
        return name;
    }
    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = OsString::from(format!("{stem}-{n}{ext}"));
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::Delivery(format!("{}: {e}", path.display()))
}
