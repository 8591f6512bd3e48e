//! Read-through cache store.
//!
//! Entries are keyed by [`QueryKey`] and published to subscribers through
//! `tokio::sync::watch` channels. Fetches run as spawned tasks; the slot map
//! is only locked for short synchronous sections, never across an await.
//!
//! Every request gets a sequence number. Only the response of the latest
//! request for a key is applied; a superseded request is aborted and any
//! response it still produces is discarded.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use lru::LruCache;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use super::config::CacheConfig;
use super::entry::{Entry, EntryStatus};
use super::error::QueryError;
use super::executor::QueryExecutor;
use super::keys::{QueryKey, Tag};
use super::lock::mutex_lock;
use super::registry::TagIndex;

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "syncdeck_cache_hit_total";
const METRIC_CACHE_MISS: &str = "syncdeck_cache_miss_total";
const METRIC_CACHE_EVICT: &str = "syncdeck_cache_evict_total";
const METRIC_CACHE_DISCARD: &str = "syncdeck_cache_discard_total";
const METRIC_CACHE_FETCH_MS: &str = "syncdeck_cache_fetch_ms";

/// Outcome of [`CacheStore::evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// No entry existed for the key.
    Absent,
    /// The entry was removed; nobody was subscribed.
    Removed,
    /// Subscribers or waiting callers remain; a fresh fetch supersedes
    /// whatever was in flight.
    Refetching,
    /// Subscribers remain but were left on `Evicted` without a refetch.
    Detached,
}

struct InFlight {
    seq: u64,
    abort: AbortHandle,
}

struct Slot<T> {
    /// Distinguishes this slot from a later one created for the same key.
    id: u64,
    tx: watch::Sender<Entry<T>>,
    subscribers: usize,
    /// Callers currently awaiting `get_or_fetch`/`refetch`.
    waiters: usize,
    inflight: Option<InFlight>,
    /// Tags declared by the most recent request for this key.
    tags: BTreeSet<Tag>,
}

impl<T> Slot<T> {
    fn new(id: u64) -> Self {
        let (tx, _rx) = watch::channel(Entry::uninitialized());
        Self {
            id,
            tx,
            subscribers: 0,
            waiters: 0,
            inflight: None,
            tags: BTreeSet::new(),
        }
    }

    fn is_observed(&self) -> bool {
        self.subscribers > 0 || self.waiters > 0
    }

    fn is_idle(&self) -> bool {
        !self.is_observed() && self.inflight.is_none()
    }

    fn is_pending_under(&self, tag: &Tag) -> bool {
        self.inflight.is_some() && self.tags.contains(tag)
    }

    fn is_fresh(&self) -> bool {
        self.inflight.is_none() && self.tx.borrow().is_servable()
    }
}

struct Slots<T> {
    map: HashMap<QueryKey, Slot<T>>,
    /// Entries with no subscriber, waiter or in-flight request, in LRU order.
    idle: LruCache<QueryKey, ()>,
}

trait ReleaseSubscriber: Send + Sync {
    fn release_subscriber(&self, key: &QueryKey, slot_id: u64);
}

struct Inner<E: QueryExecutor> {
    executor: E,
    index: TagIndex,
    config: CacheConfig,
    slots: Mutex<Slots<E::Output>>,
    next_seq: AtomicU64,
}

/// Shared handle to the query cache.
///
/// Cloning is cheap; all clones see the same entries. Create one per session
/// and call [`CacheStore::clear`] on logout.
pub struct CacheStore<E: QueryExecutor> {
    inner: Arc<Inner<E>>,
}

impl<E: QueryExecutor> Clone for CacheStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

enum Begin<E: QueryExecutor> {
    Ready(Entry<E::Output>),
    Wait(Waiter<E>),
}

impl<E: QueryExecutor> CacheStore<E> {
    /// Create a new store fetching through `executor`.
    pub fn new(executor: E, config: CacheConfig) -> Self {
        let idle = LruCache::new(config.idle_entry_limit_non_zero());
        Self {
            inner: Arc::new(Inner {
                executor,
                index: TagIndex::new(),
                config,
                slots: Mutex::new(Slots {
                    map: HashMap::new(),
                    idle,
                }),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.inner.index
    }

    pub fn executor(&self) -> &E {
        &self.inner.executor
    }

    /// Return the cached entry, or fetch it and tag the result with `tags`.
    ///
    /// Concurrent calls for the same key share one request. Entries in the
    /// error state are returned as-is; use [`CacheStore::refetch`] to retry.
    #[instrument(skip_all, fields(query = %key))]
    pub async fn get_or_fetch<I>(&self, key: &QueryKey, tags: I) -> Entry<E::Output>
    where
        I: IntoIterator<Item = Tag>,
    {
        match self.begin(key, Some(tags.into_iter().collect()), false) {
            Begin::Ready(entry) => entry,
            Begin::Wait(waiter) => waiter.wait().await,
        }
    }

    /// Fetch again regardless of the cached state, superseding any request
    /// already in flight. Reuses the tags of the previous request.
    #[instrument(skip_all, fields(query = %key))]
    pub async fn refetch(&self, key: &QueryKey) -> Entry<E::Output> {
        match self.begin(key, None, true) {
            Begin::Ready(entry) => entry,
            Begin::Wait(waiter) => waiter.wait().await,
        }
    }

    /// Like [`CacheStore::refetch`], declaring `tags` for the new request.
    #[instrument(skip_all, fields(query = %key))]
    pub async fn refetch_tagged<I>(&self, key: &QueryKey, tags: I) -> Entry<E::Output>
    where
        I: IntoIterator<Item = Tag>,
    {
        match self.begin(key, Some(tags.into_iter().collect()), true) {
            Begin::Ready(entry) => entry,
            Begin::Wait(waiter) => waiter.wait().await,
        }
    }

    /// Start a fetch unless the entry is fresh or already loading. Does not wait.
    pub fn ensure<I>(&self, key: &QueryKey, tags: I)
    where
        I: IntoIterator<Item = Tag>,
    {
        let inner = &self.inner;
        let mut guard = mutex_lock(&inner.slots, SOURCE, "ensure");
        let slots = &mut *guard;
        let slot = slots
            .map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(inner.next_seq()));
        if slot.is_fresh() || slot.inflight.is_some() {
            return;
        }
        slot.tags = tags.into_iter().collect();
        slots.idle.pop(key);
        counter!(METRIC_CACHE_MISS, "endpoint" => key.endpoint().as_str()).increment(1);
        inner.issue(slot, key);
    }

    /// Register a subscriber. The state at subscription time is delivered by
    /// the first [`Subscription::changed`] call without waiting.
    pub fn subscribe(&self, key: &QueryKey) -> Subscription<E::Output> {
        let inner = &self.inner;
        let mut guard = mutex_lock(&inner.slots, SOURCE, "subscribe");
        let slots = &mut *guard;
        slots.idle.pop(key);
        let slot = slots
            .map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(inner.next_seq()));
        slot.subscribers += 1;

        let mut rx = slot.tx.subscribe();
        rx.mark_changed();
        let owner: Arc<dyn ReleaseSubscriber> = Arc::clone(inner) as Arc<dyn ReleaseSubscriber>;
        debug!(query = %key, subscribers = slot.subscribers, "Subscriber registered");

        Subscription {
            key: key.clone(),
            slot_id: slot.id,
            rx,
            owner: Arc::downgrade(&owner),
        }
    }

    /// Remove the entry for `key`. If subscribers remain, a refetch is
    /// started for them instead. Evicting an absent key is a no-op.
    pub fn evict(&self, key: &QueryKey) -> Eviction {
        self.inner.evict(key, true)
    }

    /// Like [`CacheStore::evict`], but leaves subscribers on `Evicted`
    /// unless `refetch_subscribed` is set.
    pub(crate) fn evict_with(&self, key: &QueryKey, refetch_subscribed: bool) -> Eviction {
        self.inner.evict(key, refetch_subscribed)
    }

    /// Current state of `key` without fetching.
    pub fn peek(&self, key: &QueryKey) -> Option<Entry<E::Output>> {
        let slots = mutex_lock(&self.inner.slots, SOURCE, "peek");
        slots.map.get(key).map(|slot| slot.tx.borrow().clone())
    }

    /// Replace the cached data of `key` locally. Returns `None` when there is
    /// no data to patch. `update` runs under the store lock and must not call
    /// back into the store.
    pub fn patch<F>(&self, key: &QueryKey, update: F) -> Option<Rollback<E::Output>>
    where
        F: FnOnce(&E::Output) -> E::Output,
    {
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "patch");
        let slot = slots.map.get_mut(key)?;
        let (previous, applied) = {
            let entry = slot.tx.borrow();
            (entry.data.clone()?, entry.applied)
        };
        let next = Arc::new(update(&previous));
        slot.tx.send_modify(|entry| entry.data = Some(next));
        debug!(query = %key, "Optimistic patch applied");

        Some(Rollback {
            key: key.clone(),
            slot_id: slot.id,
            previous,
            applied,
        })
    }

    /// Undo a [`CacheStore::patch`]. Skipped (returns false) when the entry
    /// is gone or a newer server response has replaced the patched data.
    pub fn restore(&self, rollback: Rollback<E::Output>) -> bool {
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "restore");
        let Some(slot) = slots
            .map
            .get_mut(&rollback.key)
            .filter(|slot| slot.id == rollback.slot_id)
        else {
            return false;
        };
        if slot.tx.borrow().applied != rollback.applied {
            debug!(query = %rollback.key, "Rollback skipped: newer data applied");
            return false;
        }
        let previous = rollback.previous;
        slot.tx.send_modify(|entry| entry.data = Some(previous));
        debug!(query = %rollback.key, "Optimistic patch rolled back");
        true
    }

    /// Drop every entry and abort all in-flight requests.
    pub fn clear(&self) {
        let inner = &self.inner;
        let mut guard = mutex_lock(&inner.slots, SOURCE, "clear");
        let slots = &mut *guard;
        let keys: Vec<QueryKey> = slots.map.keys().cloned().collect();
        for key in &keys {
            inner.remove(slots, key);
        }
        slots.idle.clear();
        inner.index.clear();
        info!(entries = keys.len(), "Cache cleared");
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.slots, SOURCE, "len").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active subscribers for `key`.
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.inner.slots, SOURCE, "subscriber_count")
            .map
            .get(key)
            .map_or(0, |slot| slot.subscribers)
    }

    /// Subscribers plus callers awaiting a fetch of `key`.
    pub fn observer_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.inner.slots, SOURCE, "observer_count")
            .map
            .get(key)
            .map_or(0, |slot| slot.subscribers + slot.waiters)
    }

    /// Keys an invalidation of `tag` must reach: those whose last successful
    /// fetch declared it, plus those with a request in flight that declared it.
    pub fn resolve_tag(&self, tag: &Tag) -> BTreeSet<QueryKey> {
        let slots = mutex_lock(&self.inner.slots, SOURCE, "resolve_tag");
        let mut keys = self.inner.index.resolve_tag(tag);
        keys.extend(
            slots
                .map
                .iter()
                .filter(|(_, slot)| slot.is_pending_under(tag))
                .map(|(key, _)| key.clone()),
        );
        keys
    }

    fn begin(&self, key: &QueryKey, tags: Option<BTreeSet<Tag>>, force: bool) -> Begin<E> {
        let inner = &self.inner;
        let mut guard = mutex_lock(&inner.slots, SOURCE, "begin");
        let slots = &mut *guard;
        let slot = slots
            .map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(inner.next_seq()));

        if !force && slot.is_fresh() {
            let entry = slot.tx.borrow().clone();
            slots.idle.promote(key);
            counter!(METRIC_CACHE_HIT, "endpoint" => key.endpoint().as_str()).increment(1);
            debug!(query = %key, status = entry.status.as_str(), "Cache hit");
            return Begin::Ready(entry);
        }

        let joined = if force {
            None
        } else {
            slot.inflight.as_ref().map(|flight| flight.seq)
        };
        let target = match joined {
            Some(seq) => {
                debug!(query = %key, seq, "Joining in-flight fetch");
                seq
            }
            None => {
                if let Some(tags) = tags {
                    slot.tags = tags;
                }
                slots.idle.pop(key);
                counter!(METRIC_CACHE_MISS, "endpoint" => key.endpoint().as_str()).increment(1);
                inner.issue(slot, key)
            }
        };

        slot.waiters += 1;
        Begin::Wait(Waiter {
            inner: Arc::clone(inner),
            key: key.clone(),
            slot_id: slot.id,
            target,
            rx: slot.tx.subscribe(),
        })
    }
}

impl<E: QueryExecutor> Inner<E> {
    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Spawn a fetch for `key`, superseding any request already in flight.
    fn issue(self: &Arc<Self>, slot: &mut Slot<E::Output>, key: &QueryKey) -> u64 {
        if let Some(previous) = slot.inflight.take() {
            previous.abort.abort();
            counter!(METRIC_CACHE_DISCARD, "reason" => "superseded").increment(1);
            debug!(query = %key, seq = previous.seq, "Superseded fetch aborted");
        }

        let seq = self.next_seq();
        slot.tx.send_modify(|entry| entry.status = EntryStatus::Pending);

        let inner = Arc::clone(self);
        let task_key = key.clone();
        let slot_id = slot.id;
        let handle = tokio::spawn(async move {
            let started_at = Instant::now();
            let result = inner.executor.execute(&task_key).await;
            let outcome = match &result {
                Ok(_) => "success",
                Err(err) => err.kind().as_str(),
            };
            histogram!(
                METRIC_CACHE_FETCH_MS,
                "endpoint" => task_key.endpoint().as_str(),
                "outcome" => outcome
            )
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
            inner.complete(&task_key, slot_id, seq, result);
        });

        slot.inflight = Some(InFlight {
            seq,
            abort: handle.abort_handle(),
        });
        debug!(query = %key, seq, "Fetch issued");
        seq
    }

    fn complete(
        &self,
        key: &QueryKey,
        slot_id: u64,
        seq: u64,
        result: Result<E::Output, QueryError>,
    ) {
        let mut guard = mutex_lock(&self.slots, SOURCE, "complete");
        let slots = &mut *guard;
        let Some(slot) = slots.map.get_mut(key).filter(|slot| slot.id == slot_id) else {
            counter!(METRIC_CACHE_DISCARD, "reason" => "evicted").increment(1);
            debug!(query = %key, seq, "Discarding response for evicted entry");
            return;
        };
        if slot.inflight.as_ref().map(|flight| flight.seq) != Some(seq) {
            counter!(METRIC_CACHE_DISCARD, "reason" => "superseded").increment(1);
            debug!(query = %key, seq, "Discarding superseded response");
            return;
        }
        slot.inflight = None;

        let now = OffsetDateTime::now_utc();
        match result {
            Ok(data) => {
                let tags = slot.tags.clone();
                self.index.tag(key, tags.iter().cloned());
                slot.tx.send_modify(|entry| {
                    entry.status = EntryStatus::Success;
                    entry.data = Some(Arc::new(data));
                    entry.error = None;
                    entry.tags = tags;
                    entry.updated_at = Some(now);
                    entry.applied = seq;
                });
                debug!(query = %key, seq, "Fetch applied");
            }
            Err(QueryError::Cancelled) => {
                slot.tx.send_modify(|entry| {
                    entry.applied = seq;
                    entry.status = if entry.error.is_some() {
                        EntryStatus::Error
                    } else if entry.data.is_some() {
                        EntryStatus::Success
                    } else {
                        EntryStatus::Uninitialized
                    };
                });
                debug!(query = %key, seq, "Fetch cancelled by transport");
            }
            Err(err) => {
                warn!(
                    query = %key,
                    seq,
                    kind = err.kind().as_str(),
                    error = %err,
                    "Fetch failed"
                );
                slot.tx.send_modify(|entry| {
                    entry.status = EntryStatus::Error;
                    entry.error = Some(err);
                    entry.updated_at = Some(now);
                    entry.applied = seq;
                });
            }
        }

        if slot.is_idle() {
            self.park(slots, key);
        }
    }

    fn evict(self: &Arc<Self>, key: &QueryKey, refetch_subscribed: bool) -> Eviction {
        let mut guard = mutex_lock(&self.slots, SOURCE, "evict");
        let slots = &mut *guard;
        let Some(slot) = slots.map.get_mut(key) else {
            return Eviction::Absent;
        };

        if !slot.is_observed() {
            self.remove(slots, key);
            counter!(METRIC_CACHE_EVICT, "reason" => "invalidated").increment(1);
            debug!(query = %key, "Entry evicted");
            return Eviction::Removed;
        }

        // Waiters are always served by a refetch, even when subscribers are
        // detached.
        if refetch_subscribed || slot.waiters > 0 {
            counter!(METRIC_CACHE_EVICT, "reason" => "invalidated").increment(1);
            slot.tx.send_modify(|entry| {
                *entry = Entry {
                    status: EntryStatus::Pending,
                    ..Entry::evicted(entry.applied)
                };
            });
            // Index membership stays until the replacement completes.
            self.issue(slot, key);
            debug!(
                query = %key,
                subscribers = slot.subscribers,
                waiters = slot.waiters,
                "Entry evicted; refetching for observers"
            );
            return Eviction::Refetching;
        }

        if slot.inflight.is_none() && slot.tx.borrow().status == EntryStatus::Evicted {
            return Eviction::Detached;
        }
        self.index.untag(key);
        counter!(METRIC_CACHE_EVICT, "reason" => "invalidated").increment(1);
        if let Some(flight) = slot.inflight.take() {
            flight.abort.abort();
        }
        slot.tx.send_modify(|entry| *entry = Entry::evicted(entry.applied));
        debug!(query = %key, subscribers = slot.subscribers, "Entry evicted; subscribers detached");
        Eviction::Detached
    }

    /// Drop a slot entirely and tell its receivers it is gone.
    fn remove(&self, slots: &mut Slots<E::Output>, key: &QueryKey) {
        slots.idle.pop(key);
        self.index.untag(key);
        let Some(slot) = slots.map.remove(key) else {
            return;
        };
        if let Some(flight) = &slot.inflight {
            flight.abort.abort();
        }
        let applied = slot.tx.borrow().applied;
        slot.tx.send_replace(Entry::evicted(applied));
    }

    /// Move an unused slot to the idle list, evicting the least recently used
    /// idle entry once the limit is reached.
    fn park(&self, slots: &mut Slots<E::Output>, key: &QueryKey) {
        let servable = slots
            .map
            .get(key)
            .is_some_and(|slot| slot.tx.borrow().is_servable());
        if !servable {
            self.remove(slots, key);
            return;
        }
        if let Some((victim, ())) = slots.idle.push(key.clone(), ())
            && victim != *key
        {
            counter!(METRIC_CACHE_EVICT, "reason" => "capacity").increment(1);
            debug!(query = %victim, "Idle entry evicted at capacity");
            self.remove(slots, &victim);
        }
    }

    fn release_waiter(&self, key: &QueryKey, slot_id: u64) {
        let mut guard = mutex_lock(&self.slots, SOURCE, "release_waiter");
        let slots = &mut *guard;
        let Some(slot) = slots.map.get_mut(key).filter(|slot| slot.id == slot_id) else {
            return;
        };
        slot.waiters = slot.waiters.saturating_sub(1);
        if slot.subscribers > 0 || slot.waiters > 0 {
            return;
        }
        if slot.inflight.is_some() {
            counter!(METRIC_CACHE_DISCARD, "reason" => "cancelled").increment(1);
            debug!(query = %key, "Caller went away; fetch cancelled");
            self.remove(slots, key);
            return;
        }
        self.park(slots, key);
    }
}

impl<E: QueryExecutor> ReleaseSubscriber for Inner<E> {
    fn release_subscriber(&self, key: &QueryKey, slot_id: u64) {
        let mut guard = mutex_lock(&self.slots, SOURCE, "release_subscriber");
        let slots = &mut *guard;
        let Some(slot) = slots.map.get_mut(key).filter(|slot| slot.id == slot_id) else {
            return;
        };
        slot.subscribers = slot.subscribers.saturating_sub(1);
        debug!(query = %key, subscribers = slot.subscribers, "Subscriber released");
        if slot.subscribers > 0 || slot.waiters > 0 {
            return;
        }
        if slot.inflight.is_some() {
            counter!(METRIC_CACHE_DISCARD, "reason" => "cancelled").increment(1);
            debug!(query = %key, "Last subscriber left; fetch cancelled");
            self.remove(slots, key);
            return;
        }
        self.park(slots, key);
    }
}

/// Pending `get_or_fetch` caller. Dropping it releases the caller's claim on
/// the in-flight request.
struct Waiter<E: QueryExecutor> {
    inner: Arc<Inner<E>>,
    key: QueryKey,
    slot_id: u64,
    target: u64,
    rx: watch::Receiver<Entry<E::Output>>,
}

impl<E: QueryExecutor> Waiter<E> {
    async fn wait(mut self) -> Entry<E::Output> {
        loop {
            {
                let entry = self.rx.borrow_and_update();
                let settled = entry.applied >= self.target && entry.status != EntryStatus::Pending;
                if settled || entry.status == EntryStatus::Evicted {
                    return entry.clone();
                }
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

impl<E: QueryExecutor> Drop for Waiter<E> {
    fn drop(&mut self) {
        self.inner.release_waiter(&self.key, self.slot_id);
    }
}

/// Live view of one cache entry. Dropping it deregisters the subscriber.
pub struct Subscription<T> {
    key: QueryKey,
    slot_id: u64,
    rx: watch::Receiver<Entry<T>>,
    owner: Weak<dyn ReleaseSubscriber>,
}

impl<T> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest state, without waiting.
    pub fn current(&self) -> Entry<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change. Returns `None` once the entry has been
    /// dropped from the store.
    pub async fn changed(&mut self) -> Option<Entry<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.release_subscriber(&self.key, self.slot_id);
        }
    }
}

/// Snapshot taken by [`CacheStore::patch`] to undo an optimistic edit.
pub struct Rollback<T> {
    key: QueryKey,
    slot_id: u64,
    previous: Arc<T>,
    applied: u64,
}

impl<T> Rollback<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::cache::keys::Endpoint;

    /// Answers `<path>#<call number>` once a permit is available.
    struct GatedExecutor {
        calls: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedExecutor {
        fn open() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
            }
        }

        fn closed() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor for GatedExecutor {
        type Output = String;

        async fn execute(&self, key: &QueryKey) -> Result<String, QueryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| QueryError::Cancelled)?;
            permit.forget();
            let path = key.param("path").unwrap_or_default();
            if path == "/broken" {
                return Err(QueryError::server(500, "boom"));
            }
            Ok(format!("{path}#{call}"))
        }
    }

    fn listing(path: &str) -> QueryKey {
        QueryKey::new(Endpoint::ListFiles, [("path", path)])
    }

    fn store(executor: GatedExecutor) -> CacheStore<GatedExecutor> {
        CacheStore::new(executor, CacheConfig::default())
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let store = store(GatedExecutor::open());
        let key = listing("/docs");

        let first = store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;
        let second = store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;

        assert_eq!(first.data.as_deref().map(String::as_str), Some("/docs#1"));
        assert_eq!(second.data.as_deref().map(String::as_str), Some("/docs#1"));
        assert_eq!(store.executor().calls(), 1);
        assert!(store.tag_index().resolve_tag(&Tag::file_list("/docs")).contains(&key));
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_request() {
        let store = store(GatedExecutor::closed());
        let key = listing("/docs");

        let reads = futures::future::join_all((0..5).map(|_| {
            let store = store.clone();
            let key = key.clone();
            async move { store.get_or_fetch(&key, [Tag::file_list("/docs")]).await }
        }));
        let release = async {
            tokio::task::yield_now().await;
            store.executor().gate.add_permits(1);
        };
        let (entries, ()) = tokio::join!(reads, release);

        assert_eq!(store.executor().calls(), 1);
        for entry in entries {
            assert_eq!(entry.status, EntryStatus::Success);
            assert_eq!(entry.data.as_deref().map(String::as_str), Some("/docs#1"));
        }
    }

    #[tokio::test]
    async fn errors_are_stored_and_not_retried_implicitly() {
        let store = store(GatedExecutor::open());
        let key = listing("/broken");

        let entry = store.get_or_fetch(&key, [Tag::file_list("/broken")]).await;
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.error, Some(QueryError::server(500, "boom")));

        let again = store.get_or_fetch(&key, [Tag::file_list("/broken")]).await;
        assert_eq!(again.status, EntryStatus::Error);
        assert_eq!(store.executor().calls(), 1);
        // Failed fetches never tag.
        assert!(store.tag_index().resolve_tag(&Tag::file_list("/broken")).is_empty());

        let retried = store.refetch(&key).await;
        assert_eq!(retried.status, EntryStatus::Error);
        assert_eq!(store.executor().calls(), 2);
    }

    #[tokio::test]
    async fn subscriber_receives_current_state_immediately() {
        let store = store(GatedExecutor::open());
        let key = listing("/docs");
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;

        let mut sub = store.subscribe(&key);
        let first = tokio::time::timeout(Duration::from_secs(1), sub.changed())
            .await
            .expect("immediate delivery")
            .expect("entry present");
        assert_eq!(first.data.as_deref().map(String::as_str), Some("/docs#1"));
        assert_eq!(store.subscriber_count(&key), 1);

        drop(sub);
        assert_eq!(store.subscriber_count(&key), 0);
    }

    #[tokio::test]
    async fn subscriber_observes_pending_then_success() {
        let store = store(GatedExecutor::closed());
        let key = listing("/docs");

        let mut sub = store.subscribe(&key);
        let initial = sub.changed().await.expect("initial state");
        assert_eq!(initial.status, EntryStatus::Uninitialized);

        store.ensure(&key, [Tag::file_list("/docs")]);
        let pending = sub.changed().await.expect("pending state");
        assert_eq!(pending.status, EntryStatus::Pending);

        store.executor().gate.add_permits(1);
        let done = sub.changed().await.expect("settled state");
        assert_eq!(done.status, EntryStatus::Success);
    }

    #[tokio::test]
    async fn dropping_last_subscriber_cancels_pending_fetch() {
        let store = store(GatedExecutor::closed());
        let key = listing("/slow");

        let sub = store.subscribe(&key);
        store.ensure(&key, [Tag::file_list("/slow")]);
        tokio::task::yield_now().await;
        assert_eq!(store.peek(&key).map(|e| e.status), Some(EntryStatus::Pending));

        drop(sub);
        assert!(store.peek(&key).is_none());

        // A late permit reaches nobody: the task was aborted.
        store.executor().gate.add_permits(1);
        tokio::task::yield_now().await;
        assert!(store.peek(&key).is_none());
    }

    #[tokio::test]
    async fn evict_is_idempotent_without_subscribers() {
        let store = store(GatedExecutor::open());
        let key = listing("/docs");
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;

        assert_eq!(store.evict(&key), Eviction::Removed);
        assert_eq!(store.evict(&key), Eviction::Absent);
        assert!(store.peek(&key).is_none());
        assert_eq!(store.tag_index().key_count(), 0);
        assert_eq!(store.executor().calls(), 1);
    }

    #[tokio::test]
    async fn evict_with_subscriber_supersedes_running_refetch() {
        let store = store(GatedExecutor::closed());
        let key = listing("/docs");
        store.executor().gate.add_permits(1);
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;
        let mut sub = store.subscribe(&key);
        sub.changed().await;

        assert_eq!(store.evict(&key), Eviction::Refetching);
        let pending = sub.changed().await.expect("pending");
        assert_eq!(pending.status, EntryStatus::Pending);
        assert!(pending.data.is_none());
        // The refetch is now blocked inside the executor.
        tokio::task::yield_now().await;
        assert_eq!(store.executor().calls(), 2);
        assert!(store.resolve_tag(&Tag::file_list("/docs")).contains(&key));

        assert_eq!(store.evict(&key), Eviction::Refetching);
        tokio::task::yield_now().await;
        assert_eq!(store.executor().calls(), 3);

        store.executor().gate.add_permits(1);
        let refreshed = loop {
            let entry = sub.changed().await.expect("refetched");
            if entry.status == EntryStatus::Success {
                break entry;
            }
        };
        assert_eq!(refreshed.data.as_deref().map(String::as_str), Some("/docs#3"));
    }

    #[tokio::test]
    async fn first_fetch_in_flight_resolves_under_its_tags() {
        let store = store(GatedExecutor::closed());
        let key = listing("/docs");

        store.ensure(&key, [Tag::file_list("/docs")]);

        assert!(store.tag_index().resolve_tag(&Tag::file_list("/docs")).is_empty());
        assert!(store.resolve_tag(&Tag::file_list("/docs")).contains(&key));
        assert!(store.resolve_tag(&Tag::file_list("/home")).is_empty());
    }

    #[tokio::test]
    async fn invalidation_during_awaited_refetch_returns_fresh_data() {
        let store = store(GatedExecutor::closed());
        let key = listing("/docs");
        store.executor().gate.add_permits(1);
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;

        let refresh = store.refetch(&key);
        let invalidate = async {
            tokio::task::yield_now().await;
            assert_eq!(store.observer_count(&key), 1);
            assert_eq!(store.evict_with(&key, false), Eviction::Refetching);
            store.executor().gate.add_permits(1);
        };
        let (entry, ()) = tokio::join!(refresh, invalidate);

        assert_eq!(entry.status, EntryStatus::Success);
        assert_eq!(entry.data.as_deref().map(String::as_str), Some("/docs#3"));
        assert_eq!(store.executor().calls(), 3);
    }

    #[tokio::test]
    async fn idle_entries_are_bounded() {
        let store = CacheStore::new(
            GatedExecutor::open(),
            CacheConfig {
                idle_entry_limit: 2,
                ..Default::default()
            },
        );
        for path in ["/a", "/b", "/c"] {
            store.get_or_fetch(&listing(path), [Tag::file_list(path)]).await;
        }

        assert_eq!(store.len(), 2);
        assert!(store.peek(&listing("/a")).is_none());
        assert!(store.tag_index().resolve_tag(&Tag::file_list("/a")).is_empty());
    }

    #[tokio::test]
    async fn patch_and_restore_round_trip() {
        let store = store(GatedExecutor::open());
        let key = listing("/docs");
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;

        let rollback = store
            .patch(&key, |data| format!("{data}+local"))
            .expect("data to patch");
        assert_eq!(
            store.peek(&key).and_then(|e| e.data).as_deref().map(String::as_str),
            Some("/docs#1+local")
        );

        assert!(store.restore(rollback));
        assert_eq!(
            store.peek(&key).and_then(|e| e.data).as_deref().map(String::as_str),
            Some("/docs#1")
        );
    }

    #[tokio::test]
    async fn restore_is_skipped_after_newer_response() {
        let store = store(GatedExecutor::open());
        let key = listing("/docs");
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;

        let rollback = store.patch(&key, |data| format!("{data}+local")).expect("patch");
        store.refetch(&key).await;

        assert!(!store.restore(rollback));
        assert_eq!(
            store.peek(&key).and_then(|e| e.data).as_deref().map(String::as_str),
            Some("/docs#2")
        );
    }

    #[tokio::test]
    async fn clear_detaches_subscribers() {
        let store = store(GatedExecutor::open());
        let key = listing("/docs");
        store.get_or_fetch(&key, [Tag::file_list("/docs")]).await;
        let mut sub = store.subscribe(&key);
        sub.changed().await;

        store.clear();

        let last = sub.changed().await.expect("eviction notice");
        assert_eq!(last.status, EntryStatus::Evicted);
        assert!(sub.changed().await.is_none());
        assert!(store.is_empty());
        assert_eq!(store.tag_index().tag_count(), 0);
    }
}
