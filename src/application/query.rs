//! Typed payloads of cacheable reads.

use syncdeck_api_types::{AuditLogPage, FileData};

use crate::cache::{Endpoint, QueryError};

/// Decoded result of any cacheable read. The variant always matches the
/// endpoint of the query key that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Files(Vec<FileData>),
    AuditLogs(AuditLogPage),
}

impl QueryData {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Files(_) => Endpoint::ListFiles,
            Self::AuditLogs(_) => Endpoint::AuditLogs,
        }
    }

    pub fn files(&self) -> Result<&[FileData], QueryError> {
        match self {
            Self::Files(files) => Ok(files),
            other => Err(mismatch(Endpoint::ListFiles, other)),
        }
    }

    pub fn audit_logs(&self) -> Result<&AuditLogPage, QueryError> {
        match self {
            Self::AuditLogs(page) => Ok(page),
            other => Err(mismatch(Endpoint::AuditLogs, other)),
        }
    }
}

fn mismatch(expected: Endpoint, found: &QueryData) -> QueryError {
    QueryError::decode(format!(
        "expected {} payload, found {}",
        expected.as_str(),
        found.endpoint().as_str()
    ))
}
