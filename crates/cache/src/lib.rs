//! Persisted LRU cache for memoizing DID resolutions.
//!
//! - [`PersistedLruCache`]: size-bounded LRU cache mirrored to one storage record
//! - [`RecordStorage`]: the record persistence backend it writes through
//! - [`InMemoryRecordStorage`] and [`FileRecordStorage`]: bundled backends

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod persisted;
pub mod storage;

pub use error::{CacheError, Result};
pub use persisted::PersistedLruCache;
pub use storage::{
    CacheEntry, CacheItem, CacheRecord, FileRecordStorage, InMemoryRecordStorage, RecordStorage,
};
