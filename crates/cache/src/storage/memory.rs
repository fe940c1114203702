//! In-memory record storage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use vdr_types::AgentContext;

use super::{CacheRecord, RecordStorage};
use crate::error::{CacheError, Result};

type RecordKey = (String, String);

/// Record storage held in process memory.
///
/// Records do not survive a restart. Suitable for tests and ephemeral agents.
#[derive(Debug, Default)]
pub struct InMemoryRecordStorage {
    records: RwLock<HashMap<RecordKey, CacheRecord>>,
}

impl InMemoryRecordStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored across all contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn key(ctx: &AgentContext, id: &str) -> RecordKey {
        (ctx.correlation_id().to_string(), id.to_string())
    }
}

#[async_trait]
impl RecordStorage for InMemoryRecordStorage {
    async fn find_by_id(&self, ctx: &AgentContext, id: &str) -> Result<Option<CacheRecord>> {
        Ok(self.records.read().get(&Self::key(ctx, id)).cloned())
    }

    async fn save(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
        let mut records = self.records.write();
        let key = Self::key(ctx, &record.id);
        if records.contains_key(&key) {
            return Err(CacheError::DuplicateKey { id: record.id.clone() });
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
        let mut records = self.records.write();
        match records.get_mut(&Self::key(ctx, &record.id)) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            },
            None => Err(CacheError::RecordNotFound { id: record.id.clone() }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_rejects_duplicates() {
        let storage = InMemoryRecordStorage::new();
        let ctx = AgentContext::new("agent-1");
        let record = CacheRecord::new("DID_POOL_CACHE");

        storage.save(&ctx, &record).await.unwrap();
        let err = storage.save(&ctx, &record).await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_records_are_scoped_per_context() {
        let storage = InMemoryRecordStorage::new();
        let record = CacheRecord::new("DID_POOL_CACHE");

        storage.save(&AgentContext::new("tenant-a"), &record).await.unwrap();
        storage.save(&AgentContext::new("tenant-b"), &record).await.unwrap();

        assert_eq!(storage.len(), 2);
        let missing = storage.find_by_id(&AgentContext::new("tenant-c"), "DID_POOL_CACHE").await;
        assert!(missing.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let storage = InMemoryRecordStorage::new();
        let ctx = AgentContext::new("agent-1");
        let err = storage.update(&ctx, &CacheRecord::new("missing")).await.unwrap_err();
        assert!(matches!(err, CacheError::RecordNotFound { .. }));
    }
}
