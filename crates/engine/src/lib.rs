pub mod error;

pub use error::{CacheError, CacheStatus};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use geocache_core::{Record, RecordFields, RecordId, RecordSummary, ScriptProvider, VersionHistory};
use geocache_storage::schema::{bundled_history, bundled_scripts};
use geocache_storage::{
    CancelFlag, PrepareOutcome, RecordFilter, RecordStore, RetryPolicy, SchemaLifecycle,
    SchemaState, SqliteRecordStore, StoreConfig,
};
use tracing::info;

/// A geotagged record cache backed by one `SQLite` file.
///
/// Call [`GeoCache::prepare`] before anything else: record operations are
/// refused with [`CacheError::NotReady`] until the schema is ready. Writers
/// within one process are serialized; every operation uses its own
/// connection, so other processes are only kept out by `SQLite` locking and
/// the busy-retry policy.
pub struct GeoCache {
    config: StoreConfig,
    lifecycle: SchemaLifecycle,
    store: SqliteRecordStore,
    cancel: CancelFlag,
    writer: Mutex<()>,
}

impl GeoCache {
    /// A cache using the schema scripts bundled with `geocache-storage`.
    pub fn open(config: StoreConfig) -> Result<Self, CacheError> {
        Self::with_scripts(config, bundled_history()?, bundled_scripts())
    }

    pub fn with_scripts(
        config: StoreConfig,
        history: VersionHistory,
        scripts: impl ScriptProvider + 'static,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let cancel = CancelFlag::new();
        let retry = RetryPolicy::new(&config.retry, cancel.clone());
        let lifecycle =
            SchemaLifecycle::new(config.clone(), history, Arc::new(scripts), retry.clone());
        let store = SqliteRecordStore::new(config.clone(), retry);
        Ok(Self {
            config,
            lifecycle,
            store,
            cancel,
            writer: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn state(&self) -> SchemaState {
        self.lifecycle.state()
    }

    /// The version `prepare` brings the store to.
    pub fn target_version(&self) -> &str {
        self.lifecycle.history().current()
    }

    pub fn stored_version(&self) -> Result<Option<String>, CacheError> {
        Ok(self.lifecycle.stored_version()?)
    }

    /// Raising this flag makes operations waiting on a busy store give up.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn prepare(&self) -> Result<PrepareOutcome, CacheError> {
        let _writer = self.lock_writer();
        Ok(self.lifecycle.prepare()?)
    }

    pub fn insert(&self, fields: &RecordFields) -> Result<RecordId, CacheError> {
        self.ensure_ready()?;
        let _writer = self.lock_writer();
        Ok(self.store.insert(fields)?)
    }

    pub fn select_all(&self) -> Result<Vec<RecordSummary>, CacheError> {
        self.ensure_ready()?;
        Ok(self.store.select_all()?)
    }

    pub fn select_filtered(&self, filter: &RecordFilter) -> Result<Vec<RecordSummary>, CacheError> {
        self.ensure_ready()?;
        Ok(self.store.select_filtered(filter)?)
    }

    pub fn select_one(&self, id: RecordId) -> Result<Option<Record>, CacheError> {
        self.ensure_ready()?;
        Ok(self.store.select_one(id)?)
    }

    pub fn update(&self, id: RecordId, fields: &RecordFields) -> Result<(), CacheError> {
        self.ensure_ready()?;
        let _writer = self.lock_writer();
        Ok(self.store.update(id, fields)?)
    }

    pub fn delete(&self, id: RecordId) -> Result<(), CacheError> {
        self.ensure_ready()?;
        let _writer = self.lock_writer();
        Ok(self.store.delete(id)?)
    }

    /// Deletes the store file. The cache must be prepared again afterwards.
    pub fn erase_store(&self) -> Result<(), CacheError> {
        let _writer = self.lock_writer();
        geocache_storage::erase_store(&self.config.path)?;
        self.lifecycle.reset();
        info!(path = %self.config.path.display(), "store erased");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), CacheError> {
        match self.lifecycle.state() {
            SchemaState::Ready => Ok(()),
            state => Err(CacheError::NotReady(state)),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
