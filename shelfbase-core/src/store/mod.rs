// shelfbase-core/src/store/mod.rs
//! Document store abstraction
//!
//! The catalog never talks to a concrete backend; it is handed something that
//! implements [`DocumentStore`].
//!
//! ```text
//! DocumentStore trait
//!   ├── MemoryStore (in-process, RwLock guarded)
//!   └── FileStore   (MemoryStore + JSON snapshot on disk)
//! ```

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::document::DocumentId;
use crate::error::{Result, ShelfError};
use crate::find_options::FindOptions;
use crate::index::IndexSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Outcome of an `update_one`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Operations the catalog needs from a document store
///
/// Every call is a single request/response round trip. Once [`close`] has
/// returned, all operations fail with `StoreUnavailable`.
///
/// [`close`]: DocumentStore::close
pub trait DocumentStore: Send + Sync {
    /// Insert all documents or none of them
    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<DocumentId>>;

    fn find(&self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>>;

    fn count(&self, collection: &str, filter: &Value) -> Result<u64>;

    /// Apply `$set`/`$unset`/`$inc` to the first matching document
    fn update_one(&self, collection: &str, filter: &Value, update: &Value) -> Result<UpdateResult>;

    /// Delete the first matching document, returning 0 or 1
    fn delete_one(&self, collection: &str, filter: &Value) -> Result<u64>;

    fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>>;

    /// Create a secondary index, returning its name; an identical
    /// existing index is left untouched
    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<String>;

    fn list_indexes(&self, collection: &str) -> Result<Vec<String>>;

    /// Execution statistics for a filter
    fn explain(&self, collection: &str, filter: &Value) -> Result<Value>;

    /// Release the connection; calling it again is a no-op
    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Connection string naming a store backend
///
/// - `memory://` or `memory://<label>`: in-process store
/// - `file://<path>`: in-process store persisted as a JSON snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    Memory { label: Option<String> },
    File(PathBuf),
}

impl FromStr for StoreUri {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("memory://") {
            let label = (!rest.is_empty()).then(|| rest.to_string());
            return Ok(StoreUri::Memory { label });
        }
        if let Some(rest) = s.strip_prefix("file://") {
            if rest.is_empty() {
                return Err(ShelfError::InvalidArgument(
                    "file:// URI needs a path".to_string(),
                ));
            }
            return Ok(StoreUri::File(PathBuf::from(rest)));
        }
        Err(ShelfError::InvalidArgument(format!(
            "Unsupported store URI '{}': expected memory:// or file://<path>",
            s
        )))
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreUri::Memory { label: None } => write!(f, "memory://"),
            StoreUri::Memory { label: Some(label) } => write!(f, "memory://{}", label),
            StoreUri::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}
