use geocache_core::CoreError;
use geocache_storage::{SchemaState, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("cache is not ready (schema {0})")]
    NotReady(SchemaState),
}

/// Coarse outcome of a cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    NoError,
    /// Schema creation or migration failed, or the store is not prepared.
    /// A script missing during `prepare` lands here too; the cause is kept
    /// and [`StorageError::is_script_missing`] tells it apart.
    SchemaError,
    /// A read or write failed, busy retries included, or the supplied fields
    /// were rejected before reaching the store.
    StoreError,
    /// A script lookup failed outside schema preparation.
    ScriptMissing,
    NoSuchEntity,
}

impl CacheStatus {
    pub fn of<T>(result: &Result<T, CacheError>) -> Self {
        match result {
            Ok(_) => Self::NoError,
            Err(err) => err.status(),
        }
    }
}

impl CacheError {
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::NotReady(_) => CacheStatus::SchemaError,
            Self::Core(CoreError::ScriptMissing(_)) => CacheStatus::ScriptMissing,
            Self::Core(_) => CacheStatus::StoreError,
            Self::Storage(err) => match err {
                StorageError::Schema { .. } | StorageError::UnknownVersion(_) => {
                    CacheStatus::SchemaError
                }
                StorageError::NotFound(_) => CacheStatus::NoSuchEntity,
                StorageError::Core(CoreError::ScriptMissing(_)) => CacheStatus::ScriptMissing,
                _ => CacheStatus::StoreError,
            },
        }
    }
}
