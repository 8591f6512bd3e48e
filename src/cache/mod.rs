//! Tag-based read-through query cache.
//!
//! - [`CacheStore`] holds one entry per [`QueryKey`], coalesces concurrent
//!   fetches and publishes state changes to subscribers.
//! - [`TagIndex`] records which keys each [`Tag`] covers, as declared by the
//!   most recent successful fetch.
//! - [`MutationInvalidator`] runs a mutation and, on success, evicts or
//!   refetches every key under the tags it declares.
//!
//! ## Configuration
//!
//! Controlled via the `[cache]` section of `syncdeck.toml`:
//!
//! ```toml
//! [cache]
//! idle_entry_limit = 128
//! refetch_on_invalidate = true
//! ```

mod config;
mod entry;
mod error;
mod executor;
mod invalidator;
mod keys;
mod lock;
mod planner;
mod registry;
mod store;

pub use config::CacheConfig;
pub use entry::{Entry, EntryStatus};
pub use error::{ErrorKind, QueryError};
pub use executor::{Invalidates, MutationExecutor, QueryExecutor};
pub use invalidator::MutationInvalidator;
pub use keys::{Endpoint, LIST_TAG_ID, QueryKey, Tag, TagKind};
pub(crate) use lock::{rw_read, rw_write};
pub use planner::InvalidationPlan;
pub use registry::TagIndex;
pub use store::{CacheStore, Eviction, Rollback, Subscription};
