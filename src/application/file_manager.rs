//! File-manager queries and mutations on top of the query cache.
//!
//! Directory listings are cached under `FileList:<path>` and
//! `FileListAll:LIST`. Each mutation declares the listings it makes stale;
//! the invalidator evicts or refetches them once the server accepts it.

use bytes::Bytes;
use syncdeck_api_types::{DirectorySize, FileData};
use thiserror::Error;
use tracing::instrument;

use crate::cache::{
    CacheStore, Endpoint, Invalidates, MutationExecutor, MutationInvalidator, QueryError,
    QueryExecutor, QueryKey, Subscription, Tag,
};

use super::query::QueryData;

const ROOT: &str = "/";

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// A write against the remote file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMutation {
    /// Create `name` inside the directory `path`.
    CreateDirectory { path: String, name: String },
    DeleteDirectory { path: String },
    MoveOrRename { from_path: String, to_path: String },
    Copy { from_path: String, to_path: String },
    CalculateDirectorySize { path: String },
    UploadFile {
        path: String,
        file_name: String,
        content: Bytes,
    },
}

impl FileMutation {
    /// Full path of the directory a `CreateDirectory` request creates.
    pub fn created_path(path: &str, name: &str) -> String {
        if path.ends_with('/') {
            format!("{path}{name}")
        } else {
            format!("{path}/{name}")
        }
    }
}

impl Invalidates for FileMutation {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateDirectory { .. } => "createDirectory",
            Self::DeleteDirectory { .. } => "deleteDirectory",
            Self::MoveOrRename { .. } => "moveOrRenameDirectory",
            Self::Copy { .. } => "copyFileOrDirectory",
            Self::CalculateDirectorySize { .. } => "calculateDirectorySize",
            Self::UploadFile { .. } => "uploadFile",
        }
    }

    fn invalidated_tags(&self) -> Vec<Tag> {
        match self {
            Self::CreateDirectory { path, .. } | Self::UploadFile { path, .. } => {
                vec![Tag::file_list(path.as_str())]
            }
            Self::DeleteDirectory { path } => vec![Tag::file_list(listing_of(path))],
            Self::MoveOrRename { from_path, to_path } => vec![
                Tag::file_list(listing_of(from_path)),
                Tag::file_list(listing_of(to_path)),
            ],
            Self::Copy { from_path, to_path } => vec![
                Tag::file_list(listing_of(to_path)),
                Tag::file_list(listing_of(from_path)),
                Tag::file_list_all(),
            ],
            Self::CalculateDirectorySize { .. } => Vec::new(),
        }
    }
}

/// Server reply to a [`FileMutation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    DirectorySize(DirectorySize),
}

/// Drop the last `/`-separated segment: `/a/b` → `/a`, `/a` → ``.
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Directory listing that shows `path`. Top-level entries live in `/`.
fn listing_of(path: &str) -> &str {
    match parent_path(path) {
        "" => ROOT,
        parent => parent,
    }
}

pub fn list_files_key(path: &str) -> QueryKey {
    QueryKey::new(Endpoint::ListFiles, [("path", path)])
}

pub fn list_files_tags(path: &str) -> [Tag; 2] {
    [Tag::file_list(path), Tag::file_list_all()]
}

/// File-manager facade over the shared query cache.
pub struct FileManagerService<E, M>
where
    E: QueryExecutor<Output = QueryData>,
    M: MutationExecutor<Request = FileMutation, Output = MutationOutcome>,
{
    invalidator: MutationInvalidator<E, M>,
}

impl<E, M> Clone for FileManagerService<E, M>
where
    E: QueryExecutor<Output = QueryData>,
    M: MutationExecutor<Request = FileMutation, Output = MutationOutcome>,
{
    fn clone(&self) -> Self {
        Self {
            invalidator: self.invalidator.clone(),
        }
    }
}

impl<E, M> FileManagerService<E, M>
where
    E: QueryExecutor<Output = QueryData>,
    M: MutationExecutor<Request = FileMutation, Output = MutationOutcome>,
{
    pub fn new(invalidator: MutationInvalidator<E, M>) -> Self {
        Self { invalidator }
    }

    pub fn store(&self) -> &CacheStore<E> {
        self.invalidator.store()
    }

    #[instrument(skip(self))]
    pub async fn list_files(&self, path: &str) -> Result<Vec<FileData>, FileManagerError> {
        require_path(path)?;
        let entry = self
            .store()
            .get_or_fetch(&list_files_key(path), list_files_tags(path))
            .await;
        let data = entry.into_result()?;
        Ok(data.files()?.to_vec())
    }

    /// Fetch the listing again even when cached.
    #[instrument(skip(self))]
    pub async fn refresh_files(&self, path: &str) -> Result<Vec<FileData>, FileManagerError> {
        require_path(path)?;
        let data = self
            .store()
            .refetch_tagged(&list_files_key(path), list_files_tags(path))
            .await
            .into_result()?;
        Ok(data.files()?.to_vec())
    }

    /// Subscribe to a listing and make sure it is being loaded.
    pub fn watch_files(&self, path: &str) -> Result<Subscription<QueryData>, FileManagerError> {
        require_path(path)?;
        let key = list_files_key(path);
        let subscription = self.store().subscribe(&key);
        self.store().ensure(&key, list_files_tags(path));
        Ok(subscription)
    }

    pub async fn create_directory(&self, path: &str, name: &str) -> Result<(), FileManagerError> {
        require_path(path)?;
        if name.is_empty() || name.contains('/') {
            return Err(FileManagerError::InvalidInput(format!(
                "directory name `{name}` must be non-empty and contain no `/`"
            )));
        }
        self.apply(FileMutation::CreateDirectory {
            path: path.to_string(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn delete_directory(&self, path: &str) -> Result<(), FileManagerError> {
        require_path(path)?;
        self.apply(FileMutation::DeleteDirectory {
            path: path.to_string(),
        })
        .await
    }

    /// Delete `path`, hiding it from the cached parent listing right away.
    /// The listing is restored if the server rejects the delete.
    pub async fn delete_directory_optimistic(&self, path: &str) -> Result<(), FileManagerError> {
        require_path(path)?;
        let request = FileMutation::DeleteDirectory {
            path: path.to_string(),
        };
        let listing = list_files_key(listing_of(path));
        self.invalidator
            .run_optimistic(&request, &listing, |data| match data {
                QueryData::Files(files) => QueryData::Files(
                    files
                        .iter()
                        .filter(|file| file.path != path)
                        .cloned()
                        .collect(),
                ),
                other => other.clone(),
            })
            .await?;
        Ok(())
    }

    pub async fn move_or_rename(&self, from_path: &str, to_path: &str) -> Result<(), FileManagerError> {
        require_path(from_path)?;
        require_path(to_path)?;
        self.apply(FileMutation::MoveOrRename {
            from_path: from_path.to_string(),
            to_path: to_path.to_string(),
        })
        .await
    }

    pub async fn copy(&self, from_path: &str, to_path: &str) -> Result<(), FileManagerError> {
        require_path(from_path)?;
        require_path(to_path)?;
        self.apply(FileMutation::Copy {
            from_path: from_path.to_string(),
            to_path: to_path.to_string(),
        })
        .await
    }

    pub async fn calculate_directory_size(
        &self,
        path: &str,
    ) -> Result<DirectorySize, FileManagerError> {
        require_path(path)?;
        let request = FileMutation::CalculateDirectorySize {
            path: path.to_string(),
        };
        match self.invalidator.run(&request).await? {
            MutationOutcome::DirectorySize(size) => Ok(size),
            MutationOutcome::Applied => Err(QueryError::decode(
                "calculateDirectorySize returned no size",
            )
            .into()),
        }
    }

    pub async fn upload_file(
        &self,
        path: &str,
        file_name: &str,
        content: Bytes,
    ) -> Result<(), FileManagerError> {
        require_path(path)?;
        if file_name.is_empty() {
            return Err(FileManagerError::InvalidInput(
                "upload needs a file name".to_string(),
            ));
        }
        self.apply(FileMutation::UploadFile {
            path: path.to_string(),
            file_name: file_name.to_string(),
            content,
        })
        .await
    }

    async fn apply(&self, request: FileMutation) -> Result<(), FileManagerError> {
        self.invalidator.run(&request).await?;
        Ok(())
    }
}

fn require_path(path: &str) -> Result<(), FileManagerError> {
    if path.trim().is_empty() {
        return Err(FileManagerError::InvalidInput(
            "path must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_path_drops_last_segment() {
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(parent_path("/a"), "");
        assert_eq!(parent_path("a"), "");
        assert_eq!(parent_path("/a/b/"), "/a/b");
    }

    #[test]
    fn create_directory_tags_target_listing() {
        let request = FileMutation::CreateDirectory {
            path: "/docs".to_string(),
            name: "new".to_string(),
        };
        assert_eq!(request.invalidated_tags(), vec![Tag::file_list("/docs")]);
        assert_eq!(FileMutation::created_path("/docs", "new"), "/docs/new");
        assert_eq!(FileMutation::created_path("/", "new"), "/new");
    }

    #[test]
    fn move_tags_both_parents_not_the_item() {
        let request = FileMutation::MoveOrRename {
            from_path: "/a/b".to_string(),
            to_path: "/c/b".to_string(),
        };
        let tags = request.invalidated_tags();
        assert_eq!(tags, vec![Tag::file_list("/a"), Tag::file_list("/c")]);
        assert!(!tags.contains(&Tag::file_list("/a/b")));
    }

    #[test]
    fn copy_also_tags_every_listing() {
        let request = FileMutation::Copy {
            from_path: "/a/x".to_string(),
            to_path: "/b/x".to_string(),
        };
        assert_eq!(
            request.invalidated_tags(),
            vec![
                Tag::file_list("/b"),
                Tag::file_list("/a"),
                Tag::file_list_all()
            ]
        );
    }

    #[test]
    fn delete_of_top_level_entry_tags_root_listing() {
        let request = FileMutation::DeleteDirectory {
            path: "/tmp".to_string(),
        };
        assert_eq!(request.invalidated_tags(), vec![Tag::file_list("/")]);
    }

    #[test]
    fn size_and_upload_tags() {
        let size = FileMutation::CalculateDirectorySize {
            path: "/docs".to_string(),
        };
        assert!(size.invalidated_tags().is_empty());

        let upload = FileMutation::UploadFile {
            path: "/docs".to_string(),
            file_name: "a.txt".to_string(),
            content: Bytes::from_static(b"hi"),
        };
        assert_eq!(upload.invalidated_tags(), vec![Tag::file_list("/docs")]);
        assert_eq!(upload.name(), "uploadFile");
    }

    #[test]
    fn listing_key_is_canonical() {
        assert_eq!(list_files_key("/docs"), list_files_key("/docs"));
        assert_eq!(list_files_key("/docs").param("path"), Some("/docs"));
        assert_ne!(list_files_key("/docs"), list_files_key("/docs/"));
    }
}
