//! LRU cache mirrored to a single persisted record.

use std::{num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use vdr_types::AgentContext;

use crate::{
    error::{
        CacheError, ContextMismatchSnafu, InvalidLimitSnafu, RecordNotFoundSnafu, Result,
        SerializationSnafu,
    },
    storage::{CacheEntry, CacheItem, CacheRecord, RecordStorage},
};

/// A size-bounded, least-recently-used cache whose contents survive restarts.
///
/// All entries live in one storage record identified by the cache id. The
/// record is loaded lazily on first use and mirrored in memory; every
/// [`set`](Self::set) writes the complete entry set back.
///
/// # Single owner
///
/// The in-memory mirror reflects the record of exactly one [`AgentContext`].
/// The first context served becomes the owner; any call from a different
/// context fails with [`CacheError::ContextMismatch`](crate::CacheError::ContextMismatch).
/// Use one cache instance per context.
///
/// # Creation races
///
/// When two instances create the backing record at the same time, the loser's
/// create fails with a duplicate key. The loser then loads the record the
/// winner created instead of failing.
pub struct PersistedLruCache<V> {
    cache_id: String,
    limit: NonZeroUsize,
    storage: Arc<dyn RecordStorage>,
    state: Mutex<Option<LoadedCache<V>>>,
}

struct LoadedCache<V> {
    owner: String,
    entries: LruCache<String, V>,
}

impl<V> std::fmt::Debug for PersistedLruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedLruCache")
            .field("cache_id", &self.cache_id)
            .field("limit", &self.limit)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl<V> PersistedLruCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send,
{
    /// Creates a cache persisted under `cache_id` holding at most `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidLimit`](crate::CacheError::InvalidLimit) if
    /// `limit` is zero.
    pub fn new(
        cache_id: impl Into<String>,
        limit: usize,
        storage: Arc<dyn RecordStorage>,
    ) -> Result<Self> {
        let limit = NonZeroUsize::new(limit).context(InvalidLimitSnafu)?;
        Ok(Self { cache_id: cache_id.into(), limit, storage, state: Mutex::new(None) })
    }

    /// Returns the id of the backing record.
    #[must_use]
    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Looks up `key`, marking it as most recently used.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be loaded or created, or
    /// if `ctx` is not the context this cache is bound to.
    pub async fn get(&self, ctx: &AgentContext, key: &str) -> Result<Option<V>> {
        let mut state = self.state.lock().await;
        let cache = self.loaded(&mut state, ctx).await?;
        let value = cache.entries.get(key).cloned();
        trace!(cache_id = %self.cache_id, key, hit = value.is_some(), "Cache lookup");
        Ok(value)
    }

    /// Inserts or replaces `key`, evicting the least recently used entry when
    /// full, then persists all entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be loaded or written, or
    /// if `ctx` is not the context this cache is bound to. A failed write
    /// leaves the entry in memory.
    pub async fn set(&self, ctx: &AgentContext, key: &str, value: V) -> Result<()> {
        let mut state = self.state.lock().await;
        let cache = self.loaded(&mut state, ctx).await?;
        if let Some((evicted, _)) = cache.entries.push(key.to_string(), value) {
            if evicted != key {
                trace!(cache_id = %self.cache_id, key = %evicted, "Evicted least recently used entry");
            }
        }
        let record = self.to_record(&cache.entries)?;
        self.storage.update(ctx, &record).await
    }

    /// Number of entries currently held, loading the record if needed.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn len(&self, ctx: &AgentContext) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(self.loaded(&mut state, ctx).await?.entries.len())
    }

    async fn loaded<'a>(
        &self,
        state: &'a mut Option<LoadedCache<V>>,
        ctx: &AgentContext,
    ) -> Result<&'a mut LoadedCache<V>> {
        match state {
            Some(cache) => {
                ensure!(
                    cache.owner == ctx.correlation_id(),
                    ContextMismatchSnafu {
                        expected: cache.owner.as_str(),
                        actual: ctx.correlation_id(),
                    }
                );
                Ok(cache)
            },
            None => {
                let entries = self.load(ctx).await?;
                Ok(state.insert(LoadedCache { owner: ctx.correlation_id().to_string(), entries }))
            },
        }
    }

    async fn load(&self, ctx: &AgentContext) -> Result<LruCache<String, V>> {
        let record = match self.storage.find_by_id(ctx, &self.cache_id).await {
            Ok(Some(record)) => record,
            Ok(None) => self.create_record(ctx).await?,
            // The record exists but is unreadable; start empty and let the next
            // `set` overwrite it.
            Err(error @ CacheError::Serialization { .. }) => {
                warn!(
                    cache_id = %self.cache_id,
                    error = %error,
                    "Discarding persisted cache record that does not decode"
                );
                CacheRecord::new(&self.cache_id)
            },
            Err(error) => return Err(error),
        };

        let mut entries = record.entries;
        entries.sort_by_key(|entry| entry.item.last_used);

        let mut cache = LruCache::new(self.limit);
        for entry in entries {
            match serde_json::from_value::<V>(entry.item.value) {
                Ok(value) => {
                    cache.put(entry.key, value);
                },
                Err(error) => {
                    warn!(
                        cache_id = %self.cache_id,
                        key = %entry.key,
                        error = %error,
                        "Skipping cache entry that no longer deserializes"
                    );
                },
            }
        }
        debug!(cache_id = %self.cache_id, entries = cache.len(), "Loaded persisted cache");
        Ok(cache)
    }

    async fn create_record(&self, ctx: &AgentContext) -> Result<CacheRecord> {
        let record = CacheRecord::new(&self.cache_id);
        match self.storage.save(ctx, &record).await {
            Ok(()) => Ok(record),
            Err(error) if error.is_duplicate() => {
                debug!(
                    cache_id = %self.cache_id,
                    "Cache record was created concurrently, loading existing record"
                );
                self.storage
                    .find_by_id(ctx, &self.cache_id)
                    .await?
                    .context(RecordNotFoundSnafu { id: &self.cache_id })
            },
            Err(error) => Err(error),
        }
    }

    fn to_record(&self, entries: &LruCache<String, V>) -> Result<CacheRecord> {
        // `iter()` yields most recent first; rank 0 is the least recently used.
        let entries = entries
            .iter()
            .rev()
            .enumerate()
            .map(|(rank, (key, value))| {
                Ok(CacheEntry {
                    key: key.clone(),
                    item: CacheItem {
                        value: serde_json::to_value(value).context(SerializationSnafu)?,
                        last_used: rank as u64,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CacheRecord { id: self.cache_id.clone(), entries })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::{CacheError, InMemoryRecordStorage};

    fn cache(storage: &Arc<InMemoryRecordStorage>, limit: usize) -> PersistedLruCache<String> {
        PersistedLruCache::new("DID_POOL_CACHE", limit, storage.clone()).unwrap()
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let result = PersistedLruCache::<String>::new("cache", 0, storage);
        assert!(matches!(result, Err(CacheError::InvalidLimit)));
    }

    #[tokio::test]
    async fn test_first_get_creates_empty_record() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let cache = cache(&storage, 2);
        let ctx = AgentContext::new("agent");

        assert_eq!(cache.get(&ctx, "missing").await.unwrap(), None);

        let record = storage.find_by_id(&ctx, "DID_POOL_CACHE").await.unwrap().unwrap();
        assert!(record.entries.is_empty());
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used_not_least_recently_inserted() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let cache = cache(&storage, 2);
        let ctx = AgentContext::new("agent");

        cache.set(&ctx, "one", "1".to_string()).await.unwrap();
        cache.set(&ctx, "two", "2".to_string()).await.unwrap();
        cache.set(&ctx, "three", "3".to_string()).await.unwrap();
        assert_eq!(cache.get(&ctx, "one").await.unwrap(), None);

        assert_eq!(cache.get(&ctx, "two").await.unwrap().as_deref(), Some("2"));
        cache.set(&ctx, "four", "4".to_string()).await.unwrap();

        assert_eq!(cache.get(&ctx, "three").await.unwrap(), None);
        assert_eq!(cache.get(&ctx, "two").await.unwrap().as_deref(), Some("2"));
        assert_eq!(cache.get(&ctx, "four").await.unwrap().as_deref(), Some("4"));
        assert_eq!(cache.len(&ctx).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_key() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let cache = cache(&storage, 2);
        let ctx = AgentContext::new("agent");

        cache.set(&ctx, "did", "sovrinMain".to_string()).await.unwrap();
        cache.set(&ctx, "did", "indicioMain".to_string()).await.unwrap();

        assert_eq!(cache.get(&ctx, "did").await.unwrap().as_deref(), Some("indicioMain"));
        assert_eq!(cache.len(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recency_survives_reload() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let ctx = AgentContext::new("agent");

        let first = cache(&storage, 2);
        first.set(&ctx, "one", "1".to_string()).await.unwrap();
        first.set(&ctx, "two", "2".to_string()).await.unwrap();
        first.get(&ctx, "one").await.unwrap();
        // Persist the promotion of "one".
        first.set(&ctx, "one", "1".to_string()).await.unwrap();
        drop(first);

        let second = cache(&storage, 2);
        second.set(&ctx, "three", "3".to_string()).await.unwrap();

        assert_eq!(second.get(&ctx, "two").await.unwrap(), None);
        assert_eq!(second.get(&ctx, "one").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_reload_truncates_to_smaller_limit() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let ctx = AgentContext::new("agent");

        let wide = cache(&storage, 3);
        for key in ["a", "b", "c"] {
            wide.set(&ctx, key, key.to_string()).await.unwrap();
        }

        let narrow = cache(&storage, 2);
        assert_eq!(narrow.len(&ctx).await.unwrap(), 2);
        assert_eq!(narrow.get(&ctx, "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_second_context() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let cache = cache(&storage, 2);

        cache.get(&AgentContext::new("tenant-a"), "did").await.unwrap();
        let err = cache.get(&AgentContext::new("tenant-b"), "did").await.unwrap_err();

        match err {
            CacheError::ContextMismatch { expected, actual } => {
                assert_eq!(expected, "tenant-a");
                assert_eq!(actual, "tenant-b");
            },
            other => panic!("expected context mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_skips_entries_that_no_longer_deserialize() {
        let storage = Arc::new(InMemoryRecordStorage::new());
        let ctx = AgentContext::new("agent");
        let record = CacheRecord {
            id: "DID_POOL_CACHE".to_string(),
            entries: vec![
                CacheEntry {
                    key: "bad".to_string(),
                    item: CacheItem { value: serde_json::json!({ "nested": true }), last_used: 0 },
                },
                CacheEntry {
                    key: "good".to_string(),
                    item: CacheItem { value: serde_json::json!("value"), last_used: 1 },
                },
            ],
        };
        storage.save(&ctx, &record).await.unwrap();

        let cache = cache(&storage, 2);
        assert_eq!(cache.get(&ctx, "bad").await.unwrap(), None);
        assert_eq!(cache.get(&ctx, "good").await.unwrap().as_deref(), Some("value"));
    }

    /// Storage whose record decodes to garbage until it is overwritten.
    #[derive(Debug, Default)]
    struct CorruptedStorage {
        inner: InMemoryRecordStorage,
        overwritten: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl RecordStorage for CorruptedStorage {
        async fn find_by_id(&self, ctx: &AgentContext, id: &str) -> Result<Option<CacheRecord>> {
            if self.overwritten.load(std::sync::atomic::Ordering::SeqCst) {
                return self.inner.find_by_id(ctx, id).await;
            }
            let error = serde_json::from_slice::<CacheRecord>(b"").unwrap_err();
            Err(error).context(SerializationSnafu)
        }

        async fn save(&self, _ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
            Err(CacheError::DuplicateKey { id: record.id.clone() })
        }

        async fn update(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
            self.overwritten.store(true, std::sync::atomic::Ordering::SeqCst);
            self.inner.update(ctx, record).await
        }
    }

    #[tokio::test]
    async fn test_undecodable_record_starts_empty_and_is_overwritten() {
        let storage = Arc::new(CorruptedStorage::default());
        let ctx = AgentContext::new("agent");
        storage.inner.save(&ctx, &CacheRecord::new("DID_POOL_CACHE")).await.unwrap();

        let cache = PersistedLruCache::<String>::new("DID_POOL_CACHE", 2, storage.clone()).unwrap();
        assert_eq!(cache.get(&ctx, "did").await.unwrap(), None);
        cache.set(&ctx, "did", "sovrinMain".to_string()).await.unwrap();

        let reloaded =
            PersistedLruCache::<String>::new("DID_POOL_CACHE", 2, storage.clone()).unwrap();
        assert_eq!(reloaded.get(&ctx, "did").await.unwrap().as_deref(), Some("sovrinMain"));
    }

    /// Holds every `find_by_id` until all racers have looked, so all of them
    /// observe a missing record and attempt to create it.
    #[derive(Debug)]
    struct RacingStorage {
        inner: InMemoryRecordStorage,
        barrier: Barrier,
        lookups: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RecordStorage for RacingStorage {
        async fn find_by_id(&self, ctx: &AgentContext, id: &str) -> Result<Option<CacheRecord>> {
            let found = self.inner.find_by_id(ctx, id).await?;
            let lookup = self.lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if lookup < 2 {
                self.barrier.wait().await;
            }
            Ok(found)
        }

        async fn save(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
            self.inner.save(ctx, record).await
        }

        async fn update(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
            self.inner.update(ctx, record).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_single_record() {
        let storage = Arc::new(RacingStorage {
            inner: InMemoryRecordStorage::new(),
            barrier: Barrier::new(2),
            lookups: std::sync::atomic::AtomicUsize::new(0),
        });
        let ctx = AgentContext::new("agent");

        let a = PersistedLruCache::<String>::new("DID_POOL_CACHE", 5, storage.clone()).unwrap();
        let b = PersistedLruCache::<String>::new("DID_POOL_CACHE", 5, storage.clone()).unwrap();

        let (ra, rb) = tokio::join!(a.get(&ctx, "did"), b.get(&ctx, "did"));

        assert_eq!(ra.unwrap(), None);
        assert_eq!(rb.unwrap(), None);
        assert_eq!(storage.inner.len(), 1);
        // Both missed on the first lookup; the loser looked again after its duplicate.
        assert_eq!(storage.lookups.load(std::sync::atomic::Ordering::SeqCst), 3);

        a.set(&ctx, "did", "sovrinMain".to_string()).await.unwrap();
        let record = storage.inner.find_by_id(&ctx, "DID_POOL_CACHE").await.unwrap().unwrap();
        assert_eq!(record.entries.len(), 1);
    }
}
