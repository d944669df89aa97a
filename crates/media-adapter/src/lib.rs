//! Media adapters: per-source extraction of direct media URLs
//!
//! The pipeline selects one adapter per inbound URL from an ordered
//! `AdapterRegistry` and runs its extraction inside a pool resource.
//! Built-in adapters:
//! - `PageMetaAdapter` loads the page and reads its Open Graph media tags
//! - `DirectAdapter` accepts URLs that already point at a media file

pub mod adapter;
pub mod direct;
pub mod error;
pub mod filename;
pub mod page_meta;
pub mod registry;
pub mod settings;

pub use adapter::MediaAdapter;
pub use direct::DirectAdapter;
pub use error::{AdapterError, Result};
pub use filename::{MediaKind, format_size, size_suffix};
pub use page_meta::{PageFetcher, PageMetaAdapter};
pub use registry::AdapterRegistry;
pub use settings::{AdapterSettings, Quality};
