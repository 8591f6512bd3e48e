use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of a file-manager entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Directory,
    File,
    Symlink,
    #[serde(other)]
    Other,
}

/// One entry returned by the directory listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub file_type: FileType,
    #[serde(default)]
    pub permissions: u32,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub group_id: u32,
}

impl FileData {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Result of the directory size computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySize {
    #[serde(default)]
    pub path: String,
    pub size: u64,
}

/// Body for `create-directory`: the full path of the directory to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDirectoryRequest {
    pub path: String,
}

/// Body for deleting a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePathRequest {
    pub path: String,
}

/// Body for move/rename and copy operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_path: String,
    pub to_path: String,
}

/// Body for operations addressed by a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRequest {
    pub path: String,
}
