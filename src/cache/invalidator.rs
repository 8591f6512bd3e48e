//! Runs mutations and keeps the cache consistent with them.
//!
//! A successful mutation resolves its declared tags into an
//! [`InvalidationPlan`] and evicts every affected key; observed keys are
//! fetched again. A failed mutation leaves the cache untouched.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info, instrument, warn};

use super::error::QueryError;
use super::executor::{Invalidates, MutationExecutor, QueryExecutor};
use super::keys::{QueryKey, Tag};
use super::planner::InvalidationPlan;
use super::store::CacheStore;

const METRIC_MUTATION_MS: &str = "syncdeck_mutation_ms";

pub struct MutationInvalidator<E: QueryExecutor, M: MutationExecutor> {
    store: CacheStore<E>,
    mutations: Arc<M>,
}

impl<E: QueryExecutor, M: MutationExecutor> Clone for MutationInvalidator<E, M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mutations: Arc::clone(&self.mutations),
        }
    }
}

impl<E: QueryExecutor, M: MutationExecutor> MutationInvalidator<E, M> {
    pub fn new(store: CacheStore<E>, mutations: Arc<M>) -> Self {
        Self { store, mutations }
    }

    pub fn store(&self) -> &CacheStore<E> {
        &self.store
    }

    /// Send `request` and, once the server accepted it, invalidate the tags
    /// it declares.
    #[instrument(skip_all, fields(mutation = request.name()))]
    pub async fn run(&self, request: &M::Request) -> Result<M::Output, QueryError> {
        let started_at = Instant::now();
        let result = self.mutations.mutate(request).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind().as_str(),
        };
        histogram!(
            METRIC_MUTATION_MS,
            "mutation" => request.name(),
            "outcome" => outcome
        )
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(output) => {
                self.invalidate(request.invalidated_tags());
                Ok(output)
            }
            Err(err) => {
                warn!(
                    mutation = request.name(),
                    kind = err.kind().as_str(),
                    error = %err,
                    "Mutation failed; cache left untouched"
                );
                Err(err)
            }
        }
    }

    /// Apply `update` to the cached data of `key` before sending `request`,
    /// and roll it back if the mutation fails.
    ///
    /// On success the usual tag invalidation replaces the patched data with
    /// the server's, provided `key` carries one of the declared tags.
    pub async fn run_optimistic<F>(
        &self,
        request: &M::Request,
        key: &QueryKey,
        update: F,
    ) -> Result<M::Output, QueryError>
    where
        F: FnOnce(&E::Output) -> E::Output,
    {
        let rollback = self.store.patch(key, update);
        match self.run(request).await {
            Ok(output) => Ok(output),
            Err(err) => {
                if let Some(rollback) = rollback {
                    let restored = self.store.restore(rollback);
                    debug!(query = %key, restored, "Optimistic update reverted");
                }
                Err(err)
            }
        }
    }

    /// Evict every key tagged with any of `tags`, including keys whose
    /// request declaring one of them is still in flight.
    pub fn invalidate<I>(&self, tags: I) -> InvalidationPlan
    where
        I: IntoIterator<Item = Tag>,
    {
        let plan = InvalidationPlan::from_resolver(
            tags,
            |tag| self.store.resolve_tag(tag),
            |key| self.store.observer_count(key),
        );
        if plan.is_empty() {
            debug!(plan = %plan, "Nothing cached under invalidated tags");
            return plan;
        }

        info!(
            plan = %plan,
            tags = ?plan.tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Cache invalidation starting"
        );
        let refetch = self.store.config().refetch_on_invalidate;
        for key in plan.keys() {
            self.store.evict_with(key, refetch);
        }
        plan
    }
}
