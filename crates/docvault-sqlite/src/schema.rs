use docvault_core::error::{Result, VaultError};
use rusqlite::Connection;

/// Layout version written by this crate
pub const SCHEMA_VERSION: u32 = 1;

/// Create the document tables if needed and check the stored layout version
///
/// Documents are stored one row each as an encoded line. `doc_key` is the
/// encoded `_id` and is unique per collection.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS docvault_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            schema_version INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
            doc_key TEXT,
            body TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS documents_by_key
            ON documents(collection, doc_key);",
    )
    .map_err(|e| VaultError::Database(e.to_string()))?;

    conn.execute(
        "INSERT OR IGNORE INTO docvault_meta (id, schema_version) VALUES (0, ?1)",
        [SCHEMA_VERSION as i64],
    )
    .map_err(|e| VaultError::Database(e.to_string()))?;

    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(VaultError::InvalidState(format!(
            "database schema version {} is newer than supported version {}",
            current, SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Stored layout version
pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT schema_version FROM docvault_meta WHERE id = 0",
        [],
        |row| {
            let v: i64 = row.get(0)?;
            Ok(v as u32)
        },
    )
    .map_err(|e| VaultError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        conn.execute("UPDATE docvault_meta SET schema_version = 99 WHERE id = 0", [])
            .unwrap();

        assert!(matches!(init(&conn), Err(VaultError::InvalidState(_))));
    }
}
