//! Application services: the file-manager and audit-log APIs built on the
//! query cache.

pub mod audit;
pub mod file_manager;
pub mod query;

pub use audit::{AuditLogError, AuditLogQuery, AuditLogService};
pub use file_manager::{
    FileManagerError, FileManagerService, FileMutation, MutationOutcome, list_files_key,
    list_files_tags, parent_path,
};
pub use query::QueryData;
