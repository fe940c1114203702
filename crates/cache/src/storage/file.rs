//! File-backed record storage.
//!
//! Layout: `<root>/<correlation id>/<record id>.json`, with both components
//! percent-encoded so distinct ids never share a path. Records are written to
//! a private temporary file first and only then moved into place: creation
//! hard-links the temporary file to the record path, which fails if the record
//! already exists, and updates rename it over the record. A crash mid-write
//! therefore never leaves a partial record behind.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use vdr_types::AgentContext;

use super::{CacheRecord, RecordStorage};
use crate::error::{CacheError, IoSnafu, Result, SerializationSnafu};

/// Distinguishes temporary files of concurrent writers within this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Record storage persisting one JSON file per record.
#[derive(Debug, Clone)]
pub struct FileRecordStorage {
    root: PathBuf,
}

impl FileRecordStorage {
    /// Creates a storage rooted at `root`. Directories are created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the records of `ctx`.
    #[must_use]
    pub fn context_dir(&self, ctx: &AgentContext) -> PathBuf {
        self.root.join(encode_component(ctx.correlation_id()))
    }

    fn record_path(&self, ctx: &AgentContext, id: &str) -> PathBuf {
        self.context_dir(ctx).join(format!("{}.json", encode_component(id)))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.context(IoSnafu { path: parent })?;
        }
        Ok(())
    }

    /// Writes `record` to a fresh temporary file next to `path` and syncs it.
    async fn write_temp(path: &Path, record: &CacheRecord) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(record).context(SerializationSnafu)?;
        let tmp_path = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .await
            .context(IoSnafu { path: &tmp_path })?;
        file.write_all(&bytes).await.context(IoSnafu { path: &tmp_path })?;
        file.sync_all().await.context(IoSnafu { path: &tmp_path })?;
        Ok(tmp_path)
    }
}

#[async_trait]
impl RecordStorage for FileRecordStorage {
    async fn find_by_id(&self, ctx: &AgentContext, id: &str) -> Result<Option<CacheRecord>> {
        let path = self.record_path(ctx, id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(IoSnafu { path }),
        };
        let record = serde_json::from_slice(&bytes).context(SerializationSnafu)?;
        Ok(Some(record))
    }

    async fn save(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
        let path = self.record_path(ctx, &record.id);
        Self::ensure_parent(&path).await?;
        let tmp_path = Self::write_temp(&path, record).await?;

        let linked = tokio::fs::hard_link(&tmp_path, &path).await;
        // The temporary name is private to this call; a leftover only wastes space.
        let _ = tokio::fs::remove_file(&tmp_path).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(CacheError::DuplicateKey { id: record.id.clone() })
            },
            Err(e) => Err(e).context(IoSnafu { path }),
        }
    }

    async fn update(&self, ctx: &AgentContext, record: &CacheRecord) -> Result<()> {
        let path = self.record_path(ctx, &record.id);
        if !tokio::fs::try_exists(&path).await.context(IoSnafu { path: &path })? {
            return Err(CacheError::RecordNotFound { id: record.id.clone() });
        }
        let tmp_path = Self::write_temp(&path, record).await?;
        tokio::fs::rename(&tmp_path, &path).await.context(IoSnafu { path: &path })?;
        Ok(())
    }
}

/// Maps a record id or correlation id onto a file name component, injectively.
///
/// Unreserved URL characters other than `.` are kept; everything else,
/// including `.` and `%`, is percent-encoded. The result is never `.` or `..`
/// and never contains a path separator. The empty string maps to `%`, which no
/// non-empty input produces.
fn encode_component(component: &str) -> String {
    if component.is_empty() {
        return "%".to_string();
    }
    urlencoding::encode(component).replace('.', "%2E")
}
