//! SQLite-backed document database for docvault
//!
//! Key features:
//! - Collections of encoded documents, unique `_id` per collection
//! - Keyset-paginated cursors that hold the connection only per page
//! - Unordered batch inserts with per-document rejections
//! - WAL mode for better concurrency

pub mod provider;
pub mod schema;
pub mod store;

pub use provider::SqliteDatabaseProvider;
pub use store::SqliteDocumentStore;
