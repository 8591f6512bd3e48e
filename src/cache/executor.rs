//! Seams between the cache and the network.

use async_trait::async_trait;

use super::error::QueryError;
use super::keys::{QueryKey, Tag};

/// Performs the network call for a cacheable read.
///
/// Implementations must not touch the cache; they only fetch and decode.
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    async fn execute(&self, key: &QueryKey) -> Result<Self::Output, QueryError>;
}

/// A write request that knows which cached reads it makes stale.
pub trait Invalidates {
    /// Short operation name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Tags affected by this request. Must depend on the input only.
    fn invalidated_tags(&self) -> Vec<Tag>;
}

/// Sends mutations to the server.
#[async_trait]
pub trait MutationExecutor: Send + Sync + 'static {
    type Request: Invalidates + Send + Sync;
    type Output: Send;

    async fn mutate(&self, request: &Self::Request) -> Result<Self::Output, QueryError>;
}
