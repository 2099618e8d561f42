// shelfbase-core/src/store/file.rs
//! JSON-snapshot persistence on top of [`MemoryStore`]
//!
//! The whole store is loaded when the file is opened and written back on
//! [`flush`](FileStore::flush) and [`close`](DocumentStore::close). Writes go to
//! a sibling temp file first and are renamed over the snapshot.

use crate::document::DocumentId;
use crate::error::{Result, ShelfError};
use crate::find_options::FindOptions;
use crate::index::IndexSpec;
use crate::store::memory::{CollectionSnapshot, MemoryStore};
use crate::store::{DocumentStore, UpdateResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    collections: HashMap<String, CollectionSnapshot>,
}

/// File-backed store
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    // Serializes flushes so two writers never race on the temp file
    flush_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create on first flush) the snapshot at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(ShelfError::StoreUnavailable(format!(
                    "directory {} does not exist",
                    parent.display()
                )));
            }
        }

        let inner = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                ShelfError::StoreUnavailable(format!("cannot read {}: {}", path.display(), e))
            })?;
            let snapshot: SnapshotFile = serde_json::from_str(&content).map_err(|e| {
                ShelfError::StoreUnavailable(format!("corrupt snapshot {}: {}", path.display(), e))
            })?;
            MemoryStore::from_snapshot(snapshot.collections)?
        } else {
            MemoryStore::new()
        };

        info!(path = %path.display(), "opened file store");
        Ok(FileStore {
            inner,
            path,
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk
    pub fn flush(&self) -> Result<()> {
        if !self.inner.is_open() {
            return Err(ShelfError::StoreUnavailable(
                "connection is closed".to_string(),
            ));
        }
        self.write_snapshot()
    }

    fn write_snapshot(&self) -> Result<()> {
        let _guard = self.flush_lock.lock();
        let snapshot = SnapshotFile {
            collections: self.inner.snapshot(),
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "flushed snapshot");
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<DocumentId>> {
        self.inner.insert_many(collection, docs)
    }

    fn find(&self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        self.inner.find(collection, filter, options)
    }

    fn count(&self, collection: &str, filter: &Value) -> Result<u64> {
        self.inner.count(collection, filter)
    }

    fn update_one(&self, collection: &str, filter: &Value, update: &Value) -> Result<UpdateResult> {
        self.inner.update_one(collection, filter, update)
    }

    fn delete_one(&self, collection: &str, filter: &Value) -> Result<u64> {
        self.inner.delete_one(collection, filter)
    }

    fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>> {
        self.inner.aggregate(collection, pipeline)
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<String> {
        self.inner.create_index(collection, spec)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        self.inner.list_indexes(collection)
    }

    fn explain(&self, collection: &str, filter: &Value) -> Result<Value> {
        self.inner.explain(collection, filter)
    }

    /// Flush, then mark the store closed. The store is closed even when the
    /// flush fails; the flush error is returned.
    fn close(&self) -> Result<()> {
        if !self.inner.is_open() {
            return Ok(());
        }
        let flushed = self.write_snapshot();
        self.inner.close()?;
        info!(path = %self.path.display(), "file store closed");
        flushed
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}
