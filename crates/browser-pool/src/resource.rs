//! Resource contracts implemented by concrete automation handles

use std::future::Future;

use crate::error::Result;
use crate::proxy::ProxyDescriptor;

/// A long-lived automation handle owned by exactly one pool worker.
///
/// The worker hands out `&mut` access to one task at a time, so implementations
/// need no internal synchronization.
pub trait AutomationResource: Send + 'static {
    /// Release the underlying handle. Called once, after the worker has exited.
    fn release(self) -> impl Future<Output = Result<()>> + Send;
}

/// Creates the resource for one pool slot.
///
/// `proxy` is the slot's entry from the configured proxy list, or `None` when
/// the list is shorter than the pool.
pub trait ResourceFactory: Send + Sync {
    type Resource: AutomationResource;

    fn create(
        &self,
        slot: usize,
        proxy: Option<&ProxyDescriptor>,
    ) -> impl Future<Output = Result<Self::Resource>> + Send;
}
