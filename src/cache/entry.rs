//! Cache entry state as observed by callers and subscribers.

use std::collections::BTreeSet;
use std::sync::Arc;

use time::OffsetDateTime;

use super::error::QueryError;
use super::keys::Tag;

/// Lifecycle of a cache entry.
///
/// `Uninitialized -> Pending -> {Success, Error}`; `Success -> Pending` on
/// refetch; `Error -> Pending` on retry. `Evicted` is terminal: the entry is
/// gone and must be requested again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Uninitialized,
    Pending,
    Success,
    Error,
    Evicted,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
            Self::Evicted => "evicted",
        }
    }
}

/// Snapshot of one cache entry.
#[derive(Debug)]
pub struct Entry<T> {
    pub status: EntryStatus,
    /// Last successful result. Kept while a refetch is pending or failed.
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    /// Tags declared by the fetch that produced `data`.
    pub tags: BTreeSet<Tag>,
    pub updated_at: Option<OffsetDateTime>,
    /// Sequence number of the last request whose outcome was applied.
    pub(crate) applied: u64,
}

// Manual impl: `T` itself does not need to be `Clone`.
impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            tags: self.tags.clone(),
            updated_at: self.updated_at,
            applied: self.applied,
        }
    }
}

impl<T> Entry<T> {
    pub(crate) fn uninitialized() -> Self {
        Self {
            status: EntryStatus::Uninitialized,
            data: None,
            error: None,
            tags: BTreeSet::new(),
            updated_at: None,
            applied: 0,
        }
    }

    pub(crate) fn evicted(applied: u64) -> Self {
        Self {
            status: EntryStatus::Evicted,
            applied,
            ..Self::uninitialized()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == EntryStatus::Success
    }

    /// Whether the entry can be served without contacting the server.
    pub(crate) fn is_servable(&self) -> bool {
        matches!(self.status, EntryStatus::Success | EntryStatus::Error)
    }

    /// Data on success, the stored error on failure, `Cancelled` otherwise.
    pub fn into_result(self) -> Result<Arc<T>, QueryError> {
        match (self.status, self.data, self.error) {
            (EntryStatus::Error, _, Some(err)) => Err(err),
            (EntryStatus::Success | EntryStatus::Pending, Some(data), _) => Ok(data),
            _ => Err(QueryError::Cancelled),
        }
    }
}
