use async_trait::async_trait;
use netchan_core::{ChannelName, Endpoint};

use crate::error::DirectoryResult;

/// Port for the naming authority mapping channel names to endpoints
///
/// A name maps to at most one endpoint at a time. Callers resolve on every
/// open and never cache, so a stale mapping shows up as a connection error
/// on the caller's side.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Map `name` to `endpoint`.
    ///
    /// Registering the same endpoint again is a no-op; a different endpoint
    /// for a live name is rejected with `AlreadyRegistered`.
    async fn register(&self, name: &ChannelName, endpoint: &Endpoint) -> DirectoryResult<()>;

    /// Current endpoint for `name`, or `NotFound`
    async fn resolve(&self, name: &ChannelName) -> DirectoryResult<Endpoint>;

    /// Drop the mapping for `name`. Unknown names are ignored.
    async fn deregister(&self, name: &ChannelName) -> DirectoryResult<()>;
}
