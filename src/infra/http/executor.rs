//! Maps cache queries and file-manager mutations onto REST endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use syncdeck_api_types::{
    AuditLogPage, CreateDirectoryRequest, DeletePathRequest, DirectorySize, FileData, PathRequest,
    TransferRequest,
};
use tracing::debug;

use crate::application::{FileMutation, MutationOutcome, QueryData};
use crate::cache::{Endpoint, MutationExecutor, QueryError, QueryExecutor, QueryKey};

use super::client::ApiClient;

const FILE_MANAGER_PATH: &str = "api/v1/file-manager";
const CREATE_DIRECTORY_PATH: &str = "api/v1/file-manager/create-directory";
const MOVE_DIRECTORY_PATH: &str = "api/v1/file-manager/move-directory";
const COPY_DIRECTORY_PATH: &str = "api/v1/file-manager/copy-directory";
const DIRECTORY_SIZE_PATH: &str = "api/v1/file-manager/calculate-directory-size";
const UPLOAD_PATH: &str = "api/v1/file-manager/upload";
const AUDIT_LOGS_PATH: &str = "api/v1/audit/logs";

/// Reads and writes through one shared [`ApiClient`].
#[derive(Clone)]
pub struct HttpExecutor {
    client: Arc<ApiClient>,
}

impl HttpExecutor {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn list_files(&self, key: &QueryKey) -> Result<QueryData, QueryError> {
        let path = key.param("path").unwrap_or("/");
        // An empty directory comes back as `"data": null`.
        let files: Option<Vec<FileData>> = self
            .client
            .get(FILE_MANAGER_PATH, &[("path", path.to_string())])
            .await?;
        Ok(QueryData::Files(files.unwrap_or_default()))
    }

    async fn audit_logs(&self, key: &QueryKey) -> Result<QueryData, QueryError> {
        let query: Vec<(&str, String)> = ["page", "page_size", "search"]
            .into_iter()
            .filter_map(|name| key.param(name).map(|value| (name, value.to_string())))
            .collect();
        let page: AuditLogPage = self.client.get(AUDIT_LOGS_PATH, &query).await?;
        Ok(QueryData::AuditLogs(page))
    }

    async fn send_unit<B: serde::Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<MutationOutcome, QueryError> {
        let _: Option<Value> = self.client.send(method, path, body).await?;
        Ok(MutationOutcome::Applied)
    }
}

#[async_trait]
impl QueryExecutor for HttpExecutor {
    type Output = QueryData;

    async fn execute(&self, key: &QueryKey) -> Result<QueryData, QueryError> {
        debug!(query = %key, "Executing query");
        match key.endpoint() {
            Endpoint::ListFiles => self.list_files(key).await,
            Endpoint::AuditLogs => self.audit_logs(key).await,
        }
    }
}

#[async_trait]
impl MutationExecutor for HttpExecutor {
    type Request = FileMutation;
    type Output = MutationOutcome;

    async fn mutate(&self, request: &FileMutation) -> Result<MutationOutcome, QueryError> {
        match request {
            FileMutation::CreateDirectory { path, name } => {
                let body = CreateDirectoryRequest {
                    path: FileMutation::created_path(path, name),
                };
                self.send_unit(Method::POST, CREATE_DIRECTORY_PATH, &body)
                    .await
            }
            FileMutation::DeleteDirectory { path } => {
                let body = DeletePathRequest { path: path.clone() };
                self.send_unit(Method::DELETE, FILE_MANAGER_PATH, &body)
                    .await
            }
            FileMutation::MoveOrRename { from_path, to_path } => {
                let body = TransferRequest {
                    from_path: from_path.clone(),
                    to_path: to_path.clone(),
                };
                self.send_unit(Method::POST, MOVE_DIRECTORY_PATH, &body)
                    .await
            }
            FileMutation::Copy { from_path, to_path } => {
                let body = TransferRequest {
                    from_path: from_path.clone(),
                    to_path: to_path.clone(),
                };
                self.send_unit(Method::POST, COPY_DIRECTORY_PATH, &body)
                    .await
            }
            FileMutation::CalculateDirectorySize { path } => {
                let body = PathRequest { path: path.clone() };
                let mut size: DirectorySize = self
                    .client
                    .send(Method::POST, DIRECTORY_SIZE_PATH, &body)
                    .await?;
                if size.path.is_empty() {
                    size.path.clone_from(path);
                }
                Ok(MutationOutcome::DirectorySize(size))
            }
            FileMutation::UploadFile {
                path,
                file_name,
                content,
            } => {
                let mime = mime_guess::from_path(file_name).first_or_octet_stream();
                let _: Option<Value> = self
                    .client
                    .send_multipart(UPLOAD_PATH, || {
                        let part = Part::bytes(content.to_vec())
                            .file_name(file_name.clone())
                            .mime_str(mime.essence_str())
                            .map_err(|err| {
                                QueryError::decode(format!("invalid upload content type: {err}"))
                            })?;
                        Ok(Form::new().part("file", part).text("path", path.clone()))
                    })
                    .await?;
                Ok(MutationOutcome::Applied)
            }
        }
    }
}
