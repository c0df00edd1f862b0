use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{LibraryError, LibraryResult, StorageContext};

use super::statements::{self, SCHEMA_VERSION};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-manager";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "library.db";
/// Log file written next to the database while the terminal UI owns stdout.
const LOG_FILE_NAME: &str = "library.log";
/// Leaves headroom above the fixed statement set for ad-hoc queries.
const STATEMENT_CACHE_CAPACITY: usize = 32;

/// Owns the single SQLite connection. Construct it once on startup, hand it to
/// the dispatcher, and `close` it on shutdown.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Ensure the database file exists, apply the schema, and compile every
    /// statement the operations use. Safe to call against an existing file.
    pub fn open(path: impl AsRef<Path>) -> LibraryResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LibraryError::Io {
                context: "failed to create data directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).context("failed to open SQLite database")?;
        let store = Self::initialize(conn, Some(path.to_path_buf()))?;
        info!(
            path = %path.display(),
            version = SCHEMA_VERSION,
            "library database initialized"
        );
        Ok(store)
    }

    /// A throwaway store backed by memory. Used by tests and dry runs.
    pub fn open_in_memory() -> LibraryResult<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>) -> LibraryResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .context("failed to enable foreign keys")?;

        apply_schema(&conn)?;

        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        for sql in statements::ALL {
            conn.prepare_cached(sql)
                .context("failed to prepare statement")?;
        }
        debug!(count = statements::ALL.len(), "prepared statements compiled");

        Ok(Self { conn, path })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Location of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version recorded in the open database.
    pub fn schema_version(&self) -> LibraryResult<i64> {
        user_version(&self.conn)
    }

    /// Close the connection, flushing the statement cache first.
    pub fn close(self) -> LibraryResult<()> {
        self.conn.flush_prepared_statement_cache();
        self.conn
            .close()
            .map_err(|(_, source)| LibraryError::Storage {
                context: "failed to close database",
                source,
            })?;
        debug!("library database closed");
        Ok(())
    }
}

/// Create the tables on a fresh file, or confirm an existing file is not from
/// a newer build. Each statement is `IF NOT EXISTS`, so replaying is harmless.
fn apply_schema(conn: &Connection) -> LibraryResult<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(LibraryError::SchemaVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(statements::SCHEMA)
        .context("failed to create library tables")?;

    if found < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .context("failed to record schema version")?;
        debug!(from = found, to = SCHEMA_VERSION, "schema version updated");
    }

    Ok(())
}

fn user_version(conn: &Connection) -> LibraryResult<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")
}

/// Resolve the directory that holds the database and log file.
pub fn data_dir() -> LibraryResult<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or(LibraryError::HomeDirUnavailable)?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

/// Absolute path of the default SQLite database inside the user's home.
pub fn default_db_path() -> LibraryResult<PathBuf> {
    Ok(data_dir()?.join(DB_FILE_NAME))
}

/// Absolute path of the default log file inside the user's home.
pub fn default_log_path() -> LibraryResult<PathBuf> {
    Ok(data_dir()?.join(LOG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_records_schema_version() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(store.path().is_none());
    }

    #[test]
    fn schema_replay_is_harmless() {
        let store = Store::open_in_memory().unwrap();
        apply_schema(store.conn()).unwrap();
        apply_schema(store.conn()).unwrap();
        let tables: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('books', 'book_copies', 'students', 'loans')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let err = Store::initialize(conn, None).unwrap_err();
        assert!(matches!(err, LibraryError::SchemaVersion { .. }));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = Store::open_in_memory().unwrap();
        let enabled: bool = store
            .conn()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(enabled);
    }
}
