use std::path::PathBuf;

use syncdeck::application::{AuditLogError, FileManagerError};
use syncdeck::config::LoadError;
use syncdeck::infra::error::InfraError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Files(#[from] FileManagerError),
    #[error(transparent)]
    Audit(#[from] AuditLogError),
    #[error("failed to read input file {}: {source}", path.display())]
    InputFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
