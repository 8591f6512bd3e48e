use std::sync::Arc;

use syncdeck_api_types::AuditLogPage;
use thiserror::Error;
use tracing::instrument;

use crate::cache::{CacheStore, Endpoint, QueryError, QueryExecutor, QueryKey, Tag};

use super::query::QueryData;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Parameters of one audit log page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
}

impl Default for AuditLogQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl AuditLogQuery {
    /// Cache key; a blank search is the same query as no search.
    pub fn key(&self) -> QueryKey {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(search) = self.search.as_deref().map(str::trim)
            && !search.is_empty()
        {
            params.push(("search", search.to_string()));
        }
        QueryKey::new(Endpoint::AuditLogs, params)
    }
}

/// Read-only audit log access through the query cache.
pub struct AuditLogService<E: QueryExecutor<Output = QueryData>> {
    store: CacheStore<E>,
}

impl<E: QueryExecutor<Output = QueryData>> Clone for AuditLogService<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<E: QueryExecutor<Output = QueryData>> AuditLogService<E> {
    pub fn new(store: CacheStore<E>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &AuditLogQuery) -> Result<AuditLogPage, AuditLogError> {
        if query.page == 0 || query.page_size == 0 {
            return Err(AuditLogError::InvalidInput(
                "page and page_size start at 1".to_string(),
            ));
        }
        let data: Arc<QueryData> = self
            .store
            .get_or_fetch(&query.key(), [Tag::audit_log()])
            .await
            .into_result()?;
        Ok(data.audit_logs()?.clone())
    }
}
