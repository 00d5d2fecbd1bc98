use geocache_core::CoreError;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema {phase} failed: {source}")]
    Schema {
        phase: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("stored schema version {0} is not a known version")]
    UnknownVersion(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store still busy after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("operation cancelled while waiting for a busy store")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// True for the transient `SQLITE_BUSY` / `SQLITE_LOCKED` failures that
    /// are worth retrying.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            Self::Schema { source, .. } => source.is_busy(),
            _ => false,
        }
    }

    /// True when a script needed by the schema lifecycle could not be found.
    pub fn is_script_missing(&self) -> bool {
        match self {
            Self::Core(CoreError::ScriptMissing(_)) => true,
            Self::Schema { source, .. } => source.is_script_missing(),
            _ => false,
        }
    }
}
