use docvault_core::{
    error::Result,
    traits::{DatabaseProvider, DocumentStore},
};
use std::path::Path;
use std::sync::Arc;

use crate::store::SqliteDocumentStore;

/// Companion files SQLite keeps next to a WAL-mode database
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Opens SQLite document databases by file path
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDatabaseProvider;

impl SqliteDatabaseProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DatabaseProvider for SqliteDatabaseProvider {
    fn open(&self, location: &str) -> Result<Arc<dyn DocumentStore>> {
        Ok(Arc::new(SqliteDocumentStore::open(location)?))
    }

    /// Delete the database file and its WAL sidecars; a missing database is not an error
    fn drop_database(&self, location: &str) -> Result<()> {
        remove_if_exists(Path::new(location))?;
        for suffix in SIDECAR_SUFFIXES {
            remove_if_exists(Path::new(&format!("{}{}", location, suffix)))?;
        }
        tracing::debug!(location, "dropped database");
        Ok(())
    }

    fn kind(&self) -> &str {
        "sqlite"
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
