//! Per-URL media processing pipeline
//!
//! Consumes the resource pool, adapters and quota guard to turn inbound URLs
//! into delivered media:
//! - `Processor` fans out one task per URL and drives the state machine
//! - `RetryPolicy` wraps extraction and downloads as a single retried unit
//! - `ProgressSender` / `ProgressReceiver` carry ordered status events to the
//!   delivery task, ending with one acknowledged terminal event
//! - `Messenger` is the delivery collaborator contract

pub mod context;
pub mod download;
pub mod error;
pub mod media;
pub mod messenger;
pub mod processor;
pub mod progress;
pub mod retry;
pub mod status;

pub use context::{ProcessingContext, extract_urls};
pub use download::{Download, Downloader};
pub use error::{Error, Result, RetryError};
pub use media::{ByteStream, Grouping, MediaItem, Oversized, group_media};
pub use messenger::{ChatRef, MessageRef, Messenger};
pub use processor::{PipelineConfig, Processor, UrlOutcome};
pub use progress::{Outcome, ProgressEvent, ProgressReceiver, ProgressSender, progress_channel};
pub use retry::RetryPolicy;
