//! Error type shared by the store and the dispatcher. The front end only needs
//! to tell a rejected request ("validation") apart from everything else, but
//! the extra variants let it phrase missing rows and duplicates clearly.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the persistence and dispatch layers.
pub type LibraryResult<T> = Result<T, LibraryError>;

#[derive(Debug, Error)]
pub enum LibraryError {
    /// A required field is missing or malformed. Raised before any write.
    #[error("{0}")]
    Validation(String),

    /// A referenced row does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A unique column other than the ISBN upsert key already holds the value.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: &'static str, value: String },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid payload for {channel}: {source}")]
    Payload {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context} at {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not locate the home directory")]
    HomeDirUnavailable,

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: i64, supported: i64 },
}

impl LibraryError {
    /// A rejected request; `message` is shown to the user as-is.
    pub fn validation(message: impl Into<String>) -> Self {
        LibraryError::Validation(message.into())
    }

    /// A missing row, keyed by whatever the caller looked it up with.
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        LibraryError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether the request was rejected before touching the database.
    pub fn is_validation(&self) -> bool {
        matches!(self, LibraryError::Validation(_))
    }
}

/// Attach a short "failed to ..." description to a rusqlite error, the same way
/// the rest of the code base uses `anyhow::Context`.
pub(crate) trait StorageContext<T> {
    fn context(self, context: &'static str) -> LibraryResult<T>;
}

impl<T> StorageContext<T> for Result<T, rusqlite::Error> {
    fn context(self, context: &'static str) -> LibraryResult<T> {
        self.map_err(|source| LibraryError::Storage { context, source })
    }
}
