//! Bounded pool of automation resources (headless browser-like handles)
//!
//! A fixed number of resources is created up front, each owned by exactly one
//! worker task reading from its own bounded queue. Callers dispatch work with
//! `ResourcePool::use_resource`, which picks a slot round-robin and waits for
//! the task's result or pool shutdown, whichever comes first.
//!
//! Lifecycle:
//! 1. `ResourcePool::new` validates the config and launches every resource
//!    (fails fast and releases the ones already created on the first error)
//! 2. `use_resource` queues a task on the next slot; panics become errors
//! 3. `close` cancels the shared context, closes every queue, waits for the
//!    workers to drain, then releases every handle

pub mod browser;
pub mod context;
pub mod error;
pub mod pool;
pub mod proxy;
pub mod resource;

pub use browser::{HttpBrowser, HttpBrowserFactory};
pub use context::{ExecutionContext, Interrupted};
pub use error::{Error, Result};
pub use pool::{PoolConfig, ResourcePool};
pub use proxy::ProxyDescriptor;
pub use resource::{AutomationResource, ResourceFactory};
