use std::sync::Arc;

use tracing::info;

use crate::application::{AuditLogService, FileManagerService};
use crate::cache::{CacheConfig, CacheStore, MutationInvalidator};
use crate::config::Settings;
use crate::infra::error::InfraError;
use crate::infra::http::{ApiClient, HttpExecutor};

/// Everything one signed-in user needs: a single cache shared by the
/// file-manager and audit services.
///
/// Create it at startup and call [`Session::logout`] to tear the cache down.
pub struct Session {
    store: CacheStore<HttpExecutor>,
    files: FileManagerService<HttpExecutor, HttpExecutor>,
    audit: AuditLogService<HttpExecutor>,
}

impl Session {
    pub fn connect(settings: &Settings) -> Result<Self, InfraError> {
        let client = Arc::new(ApiClient::new(&settings.api)?);
        let executor = HttpExecutor::new(client);
        let store = CacheStore::new(executor.clone(), CacheConfig::from(&settings.cache));
        let invalidator = MutationInvalidator::new(store.clone(), Arc::new(executor));

        info!(base_url = %settings.api.base_url, "Session started");
        Ok(Self {
            files: FileManagerService::new(invalidator),
            audit: AuditLogService::new(store.clone()),
            store,
        })
    }

    pub fn files(&self) -> &FileManagerService<HttpExecutor, HttpExecutor> {
        &self.files
    }

    pub fn audit(&self) -> &AuditLogService<HttpExecutor> {
        &self.audit
    }

    pub fn store(&self) -> &CacheStore<HttpExecutor> {
        &self.store
    }

    /// Drop every cached entry and abort in-flight fetches.
    pub fn logout(self) {
        self.store.clear();
        info!("Session closed");
    }
}
