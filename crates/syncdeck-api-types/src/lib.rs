//! Shared request and response schemas for the dashboard REST API.
//!
//! Every JSON response from the server is wrapped in an [`Envelope`]. The
//! payload types here are the only shapes the client accepts; anything else
//! is reported as a decode failure by the caller.

mod audit;
mod auth;
mod envelope;
mod files;

pub use audit::{AuditAction, AuditLog, AuditLogPage, AuditResourceType};
pub use auth::{RefreshTokenRequest, RefreshTokenResponse};
pub use envelope::Envelope;
pub use files::{
    CreateDirectoryRequest, DeletePathRequest, DirectorySize, FileData, FileType, PathRequest,
    TransferRequest,
};
