// shelfbase-core/src/connection.rs
//! Scoped store acquisition
//!
//! A [`Connection`] owns the single store handle of a process. Catalog
//! services borrow it through a shared `Arc`; the handle is released by
//! [`Connection::close`] or, on every other exit path, by `Drop`.

use crate::catalog::CatalogService;
use crate::error::Result;
use crate::store::{DocumentStore, FileStore, MemoryStore, StoreUri};
use std::sync::Arc;
use tracing::{info, warn};

pub type SharedStore = Arc<dyn DocumentStore>;

pub struct Connection {
    store: SharedStore,
    uri: StoreUri,
}

impl Connection {
    /// Acquire the store named by `uri`.
    ///
    /// Every `memory://` connection gets its own empty store; the label is
    /// informational.
    pub fn open(uri: &StoreUri) -> Result<Self> {
        let store: SharedStore = match uri {
            StoreUri::Memory { .. } => Arc::new(MemoryStore::new()),
            StoreUri::File(path) => Arc::new(FileStore::open(path)?),
        };
        info!(uri = %uri, "connection opened");
        Ok(Connection {
            store,
            uri: uri.clone(),
        })
    }

    /// Wrap an already constructed store
    pub fn from_store(store: SharedStore, uri: StoreUri) -> Self {
        Connection { store, uri }
    }

    pub fn uri(&self) -> &StoreUri {
        &self.uri
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_open(&self) -> bool {
        self.store.is_open()
    }

    /// Catalog service over `collection`, sharing this connection's handle
    pub fn catalog(&self, collection: &str) -> CatalogService<dyn DocumentStore> {
        CatalogService::new(Arc::clone(&self.store), collection)
    }

    /// Release the store, reporting any failure to persist it
    pub fn close(self) -> Result<()> {
        self.store.close()?;
        info!(uri = %self.uri, "connection closed");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.store.is_open() {
            if let Err(e) = self.store.close() {
                warn!(uri = %self.uri, error = %e, "failed to release store");
            }
        }
    }
}

/// Open `uri`, run `f`, and release the store whether or not `f` succeeded.
///
/// An error from `f` wins over an error from releasing the store.
pub fn with_connection<T, F>(uri: &StoreUri, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let conn = Connection::open(uri)?;
    let outcome = f(&conn);
    let released = conn.close();

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!(error = %release_err, "failed to release store after error");
            Err(e)
        }
    }
}
