//! Record storage backing the persisted cache.
//!
//! The cache keeps its whole state in a single record. Backends only need
//! three operations on it: look it up, create it (failing on duplicates), and
//! overwrite it. Every operation is scoped by the [`AgentContext`] it runs in.

mod file;
mod memory;

use std::fmt;

use async_trait::async_trait;
pub use file::FileRecordStorage;
pub use memory::InMemoryRecordStorage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vdr_types::AgentContext;

use crate::error::Result;

/// A cached value together with its recency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem {
    /// Serialized value.
    pub value: Value,
    /// Recency rank. Higher means more recently used.
    pub last_used: u64,
}

/// A single keyed entry of a [`CacheRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// Cached item.
    pub item: CacheItem,
}

/// The persisted form of a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Record id (the cache id).
    pub id: String,
    /// Entries, in no particular order. Recency is carried by `last_used`.
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
}

impl CacheRecord {
    /// Creates an empty record.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), entries: Vec::new() }
    }
}

/// Storage backend for cache records.
///
/// Implementations must make [`save`](Self::save) fail with
/// [`CacheError::DuplicateKey`](crate::CacheError::DuplicateKey) when a record
/// with the same id already exists in the context. The persisted cache relies
/// on this to recover from concurrent first-time creation.
#[async_trait]
pub trait RecordStorage: Send + Sync + fmt::Debug {
    /// Returns the record with `id`, or `None` if it does not exist.
    async fn find_by_id(&self, ctx: &AgentContext, id: &str) -> Result<Option<CacheRecord>>;

    /// Creates a new record.
    async fn save(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()>;

    /// Overwrites an existing record.
    async fn update(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()>;
}
