//! Downloaded media items and size-based grouping

use std::fmt;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use media_adapter::MediaKind;

/// Body of a downloaded item. Dropping it closes the underlying connection.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// One downloaded item, owning its open byte stream.
pub struct MediaItem {
    pub filename: String,
    /// Size in bytes, 0 when unknown.
    pub size: u64,
    pub kind: MediaKind,
    pub direct_url: String,
    pub stream: ByteStream,
}

impl MediaItem {
    pub fn new(filename: String, size: u64, direct_url: String, stream: ByteStream) -> Self {
        let kind = MediaKind::from_filename(&filename);
        Self {
            filename,
            size,
            kind,
            direct_url,
            stream,
        }
    }
}

impl fmt::Debug for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaItem")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("kind", &self.kind)
            .field("direct_url", &self.direct_url)
            .finish_non_exhaustive()
    }
}

/// An item too large to deliver inline, with its 1-based position among the
/// URL's downloaded items.
#[derive(Debug)]
pub struct Oversized {
    pub position: usize,
    pub item: MediaItem,
}

#[derive(Debug, Default)]
pub struct Grouping {
    pub groups: Vec<Vec<MediaItem>>,
    pub oversized: Vec<Oversized>,
}

/// Partition `items` into groups whose cumulative size stays within `max_size`.
///
/// Items are kept in order. An item whose own size meets or exceeds
/// `max_size` is never grouped and is returned in `oversized` instead.
pub fn group_media(items: Vec<MediaItem>, max_size: u64) -> Grouping {
    let mut grouping = Grouping::default();
    let mut current: Vec<MediaItem> = Vec::new();
    let mut current_size = 0u64;

    for (idx, item) in items.into_iter().enumerate() {
        if item.size >= max_size {
            grouping.oversized.push(Oversized {
                position: idx + 1,
                item,
            });
            continue;
        }
        if current_size + item.size > max_size && !current.is_empty() {
            grouping.groups.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += item.size;
        current.push(item);
    }
    if !current.is_empty() {
        grouping.groups.push(current);
    }
    grouping
}

pub fn total_size(items: &[MediaItem]) -> u64 {
    items.iter().map(|i| i.size).sum()
}
