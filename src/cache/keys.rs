//! Cache key definitions.
//!
//! Defines `QueryKey` for cached reads and `Tag` for invalidation labels.

use std::collections::BTreeMap;
use std::fmt;

/// Remote read operations that can be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// Directory listing (`getFilesInPath`).
    ListFiles,
    /// Paginated audit log listing.
    AuditLogs,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListFiles => "getFilesInPath",
            Self::AuditLogs => "listAuditLogs",
        }
    }
}

/// Identifies one distinct read: an endpoint plus its canonical parameters.
///
/// Parameters are held in a sorted map so two keys built from the same pairs
/// in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    endpoint: Endpoint,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new<I, K, V>(endpoint: Endpoint, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            endpoint,
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint.as_str())?;
        f.write_str("(")?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        f.write_str(")")
    }
}

/// Tag families a query can provide and a mutation can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    /// Listing of a single directory, identified by its path.
    FileList,
    /// Every directory listing.
    FileListAll,
    /// Audit log listings.
    AuditLog,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileList => "FileList",
            Self::FileListAll => "FileListAll",
            Self::AuditLog => "AuditLog",
        }
    }
}

/// Identifier used by collection-wide tags.
pub const LIST_TAG_ID: &str = "LIST";

/// Invalidation label, rendered as `Kind:id` (e.g. `FileList:/home/user`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub kind: TagKind,
    pub id: String,
}

impl Tag {
    pub fn new(kind: TagKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn file_list(path: impl Into<String>) -> Self {
        Self::new(TagKind::FileList, path)
    }

    pub fn file_list_all() -> Self {
        Self::new(TagKind::FileListAll, LIST_TAG_ID)
    }

    pub fn audit_log() -> Self {
        Self::new(TagKind::AuditLog, LIST_TAG_ID)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}
