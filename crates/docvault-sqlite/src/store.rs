use docvault_core::{
    document::{codec, Document, ObjectId, ID_FIELD},
    error::{Result, VaultError},
    traits::{DocumentCursor, DocumentStore, InsertOutcome, Rejection},
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::schema;

fn db_err(e: rusqlite::Error) -> VaultError {
    VaultError::Database(e.to_string())
}

/// SQLite-backed document database
///
/// Each collection is a set of encoded document lines keyed by `_id`.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteDocumentStore {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(db_err)?;

        Self::configure_connection(&conn, true)?;
        schema::init(&conn)?;

        tracing::debug!(path = %path.display(), "opened document store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, gone when dropped
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::configure_connection(&conn, false)?;
        schema::init(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn configure_connection(conn: &Connection, wal_mode: bool) -> Result<()> {
        if wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| VaultError::Configuration(e.to_string()))?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| VaultError::Configuration(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| VaultError::Configuration(e.to_string()))?;
        Ok(())
    }

    /// Fetch up to `limit` rows after `after_seq`
    fn fetch_page(&self, collection: &str, after_seq: i64, limit: usize) -> Result<Vec<(i64, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT seq, body FROM documents
                 WHERE collection = ?1 AND seq > ?2
                 ORDER BY seq LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![collection, after_seq, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn collection_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM collections ORDER BY name")
            .map_err(db_err)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(db_err)?;
        Ok(names)
    }

    fn has_collection(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM collections WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(found > 0)
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("INSERT OR IGNORE INTO collections (name) VALUES (?1)", [name])
            .map_err(db_err)?;
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM documents WHERE collection = ?1", [name])
            .map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM collections WHERE name = ?1", [name])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(removed > 0)
    }

    fn cursor<'a>(&'a self, name: &str, batch_size: usize) -> Result<DocumentCursor<'a>> {
        Ok(Box::new(SqliteCursor {
            store: self,
            collection: name.to_string(),
            batch_size: batch_size.max(1),
            last_seq: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<InsertOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("INSERT OR IGNORE INTO collections (name) VALUES (?1)", [name])
            .map_err(db_err)?;

        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO documents (collection, doc_key, body) VALUES (?1, ?2, ?3)",
                )
                .map_err(db_err)?;

            for (index, mut doc) in docs.into_iter().enumerate() {
                if !doc.contains_key(ID_FIELD) {
                    doc.insert(ID_FIELD, ObjectId::new());
                }
                let doc_key = doc.id().map(|id| codec::encode_value(id).to_string());
                let body = codec::encode(&doc);

                match stmt.execute(params![name, doc_key, body]) {
                    Ok(_) => outcome.inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        outcome.rejected.push(Rejection {
                            index,
                            reason: format!(
                                "duplicate key: {} {}",
                                ID_FIELD,
                                doc_key.as_deref().unwrap_or("null")
                            ),
                        });
                    }
                    Err(e) => return Err(db_err(e)),
                }
            }
        }

        tx.commit().map_err(db_err)?;
        Ok(outcome)
    }

    fn count(&self, name: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }
}

/// Keyset-paginated cursor; the connection is locked only while a page loads
struct SqliteCursor<'a> {
    store: &'a SqliteDocumentStore,
    collection: String,
    batch_size: usize,
    last_seq: i64,
    buffer: VecDeque<String>,
    exhausted: bool,
}

impl Iterator for SqliteCursor<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .store
                .fetch_page(&self.collection, self.last_seq, self.batch_size)
            {
                Ok(page) => {
                    if page.len() < self.batch_size {
                        self.exhausted = true;
                    }
                    if let Some((seq, _)) = page.last() {
                        self.last_seq = *seq;
                    }
                    self.buffer.extend(page.into_iter().map(|(_, body)| body));
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let body = self.buffer.pop_front()?;
        Some(codec::decode(&body).map_err(|e| {
            self.exhausted = true;
            self.buffer.clear();
            VaultError::Database(format!(
                "corrupt document in collection {}: {}",
                self.collection, e
            ))
        }))
    }
}
