use crate::document::Document;
use crate::error::Result;
use std::sync::Arc;

/// Forward-only cursor over the documents of one collection
///
/// Implementations fetch in batches so resident memory stays bounded by the
/// batch size, never by the collection size.
pub type DocumentCursor<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// A document rejected by an unordered batch insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the document inside the submitted batch
    pub index: usize,

    /// Why the database refused it (duplicate key, ...)
    pub reason: String,
}

/// Result of an unordered batch insert
///
/// Individual rejections do not prevent sibling documents from being inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub rejected: Vec<Rejection>,
}

/// Document database handle
///
/// Handles are constructed once per operation and passed through the
/// pipeline; nothing here is global.
pub trait DocumentStore: Send + Sync {
    /// Names of every collection, in no particular order
    fn collection_names(&self) -> Result<Vec<String>>;

    /// Whether the collection exists (possibly empty)
    fn has_collection(&self, name: &str) -> Result<bool>;

    /// Create an empty collection if it does not exist
    fn create_collection(&self, name: &str) -> Result<()>;

    /// Drop the collection and all of its documents
    ///
    /// Returns `false` when the collection did not exist.
    fn drop_collection(&self, name: &str) -> Result<bool>;

    /// Open a cursor over every document of the collection
    ///
    /// A missing collection yields an empty cursor.
    fn cursor<'a>(&'a self, name: &str, batch_size: usize) -> Result<DocumentCursor<'a>>;

    /// Insert a batch without ordering guarantees
    ///
    /// An `Err` means the whole batch failed; per-document failures are
    /// reported in [`InsertOutcome::rejected`].
    fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<InsertOutcome>;

    /// Number of documents in the collection (0 when missing)
    fn count(&self, name: &str) -> Result<u64>;
}

/// Opens and destroys databases by location
pub trait DatabaseProvider: Send + Sync {
    /// Open (creating if needed) the database at `location`
    fn open(&self, location: &str) -> Result<Arc<dyn DocumentStore>>;

    /// Remove the database at `location` entirely
    fn drop_database(&self, location: &str) -> Result<()>;

    /// Provider identifier, e.g. "sqlite"
    fn kind(&self) -> &str;
}
