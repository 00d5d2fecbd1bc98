use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use geocache_core::script::{Script, ScriptProvider};
use geocache_core::version::{MigrationStep, VersionHistory, create_script_name};
use geocache_core::{CoreError, MemoryScripts};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::connection::open_connection;
use crate::error::StorageError;
use crate::retry::RetryPolicy;

/// Schema versions shipped with this crate, oldest first.
pub const SCHEMA_VERSIONS: [&str; 2] = ["1.0", "1.1"];

const CREATE_1_0: &str = include_str!("../sql/create_1.0.sql");
const CREATE_1_1: &str = include_str!("../sql/create_1.1.sql");
const MIGRATE_1_0_1_1: &str = include_str!("../sql/migrate_1.0_1.1.sql");

const VERSION_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS Version (version TEXT NOT NULL)";

/// The scripts for [`SCHEMA_VERSIONS`], compiled into the crate.
pub fn bundled_scripts() -> MemoryScripts {
    MemoryScripts::new()
        .with("create_1.0", CREATE_1_0)
        .with("create_1.1", CREATE_1_1)
        .with("migrate_1.0_1.1", MIGRATE_1_0_1_1)
}

pub fn bundled_history() -> Result<VersionHistory, CoreError> {
    VersionHistory::new(SCHEMA_VERSIONS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Uninitialized,
    Creating,
    Migrating,
    Ready,
    Failed,
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Migrating => "migrating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a successful [`SchemaLifecycle::prepare`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    Created { version: String },
    Migrated {
        from: String,
        to: String,
        steps: Vec<MigrationStep>,
    },
    Current { version: String },
}

/// Brings the store to the current schema version: creates it when no version
/// is recorded, migrates it forward when an older one is.
pub struct SchemaLifecycle {
    config: StoreConfig,
    history: VersionHistory,
    scripts: Arc<dyn ScriptProvider>,
    retry: RetryPolicy,
    state: Mutex<SchemaState>,
}

impl SchemaLifecycle {
    pub fn new(
        config: StoreConfig,
        history: VersionHistory,
        scripts: Arc<dyn ScriptProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            history,
            scripts,
            retry,
            state: Mutex::new(SchemaState::Uninitialized),
        }
    }

    pub fn state(&self) -> SchemaState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SchemaState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Forgets the outcome of earlier preparation, e.g. after the store file
    /// has been erased.
    pub fn reset(&self) {
        self.set_state(SchemaState::Uninitialized);
    }

    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    /// The version recorded in the store, if any.
    pub fn stored_version(&self) -> Result<Option<String>, StorageError> {
        self.retry.run("stored_version", || {
            let conn = open_connection(&self.config)?;
            read_version(&conn)
        })
    }

    /// Creates or migrates the store as needed. Ends in [`SchemaState::Ready`]
    /// on success and [`SchemaState::Failed`] otherwise; a failed migration
    /// leaves the store exactly as it was.
    pub fn prepare(&self) -> Result<PrepareOutcome, StorageError> {
        let result = self.retry.run("prepare", || {
            let mut conn = open_connection(&self.config)?;
            self.prepare_on(&mut conn)
        });
        match &result {
            Ok(outcome) => {
                self.set_state(SchemaState::Ready);
                info!(?outcome, path = %self.config.path.display(), "schema ready");
            }
            Err(err) => {
                self.set_state(SchemaState::Failed);
                warn!(
                    error = %err,
                    path = %self.config.path.display(),
                    "schema preparation failed"
                );
            }
        }
        result
    }

    /// Reads the stored version and acts on it inside one write transaction,
    /// so no other preparer can change the version in between.
    fn prepare_on(&self, conn: &mut Connection) -> Result<PrepareOutcome, StorageError> {
        let target = self.history.current().to_string();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match read_version(&tx)? {
            None => {
                self.set_state(SchemaState::Creating);
                info!(version = %target, "creating schema");
                self.create(tx, &target)?;
                Ok(PrepareOutcome::Created { version: target })
            }
            Some(stored) if stored == target => {
                debug!(version = %stored, "schema is current");
                tx.commit()?;
                Ok(PrepareOutcome::Current { version: stored })
            }
            Some(stored) => {
                let steps = self.plan(&stored)?;
                self.set_state(SchemaState::Migrating);
                info!(from = %stored, to = %target, steps = steps.len(), "migrating schema");
                self.migrate(tx, &steps, &target)?;
                Ok(PrepareOutcome::Migrated {
                    from: stored,
                    to: target,
                    steps,
                })
            }
        }
    }

    fn plan(&self, stored: &str) -> Result<Vec<MigrationStep>, StorageError> {
        if !self.history.contains(stored) {
            return Err(StorageError::UnknownVersion(stored.to_string()));
        }
        Ok(self.history.steps_to_current(stored))
    }

    fn create(&self, tx: Transaction<'_>, version: &str) -> Result<(), StorageError> {
        let name = create_script_name(version);
        let result = Script::load(self.scripts.as_ref(), &name)
            .map_err(StorageError::from)
            .and_then(|script| run_script(&tx, &script))
            .and_then(|()| record_version(&tx, version));
        match result {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(err) => {
                warn!(script = %name, error = %err, "schema creation failed, rolling back");
                rollback(tx);
                Err(StorageError::Schema {
                    phase: format!("create {version}"),
                    source: Box::new(err),
                })
            }
        }
    }

    fn migrate(
        &self,
        tx: Transaction<'_>,
        steps: &[MigrationStep],
        target: &str,
    ) -> Result<(), StorageError> {
        for step in steps {
            info!(%step, "applying migration step");
            let result = Script::load(self.scripts.as_ref(), &step.script_name())
                .map_err(StorageError::from)
                .and_then(|script| run_script(&tx, &script));
            if let Err(err) = result {
                warn!(%step, error = %err, "migration step failed, rolling back");
                rollback(tx);
                return Err(StorageError::Schema {
                    phase: format!("migrate {step}"),
                    source: Box::new(err),
                });
            }
        }
        if let Err(err) = record_version(&tx, target) {
            rollback(tx);
            return Err(StorageError::Schema {
                phase: format!("record version {target}"),
                source: Box::new(err),
            });
        }
        tx.commit()?;
        Ok(())
    }
}

/// Reads the single row of the `Version` table. A missing table or an empty
/// one both mean no schema has been created.
pub fn read_version(conn: &Connection) -> Result<Option<String>, StorageError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'Version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }
    let version = conn
        .query_row("SELECT version FROM Version LIMIT 1", [], |row| row.get(0))
        .optional()?;
    Ok(version)
}

fn record_version(tx: &Transaction, version: &str) -> Result<(), StorageError> {
    tx.execute_batch(VERSION_TABLE_SQL)?;
    tx.execute("DELETE FROM Version", [])?;
    tx.execute("INSERT INTO Version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn run_script(tx: &Transaction, script: &Script) -> Result<(), StorageError> {
    for (index, statement) in script.executable().enumerate() {
        debug!(script = %script.name, index, "executing statement");
        tx.execute_batch(statement)?;
    }
    Ok(())
}

fn rollback(tx: Transaction) {
    if let Err(err) = tx.rollback() {
        warn!(error = %err, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::CancelFlag;

    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn lifecycle(
        dir: &tempfile::TempDir,
        versions: &[&str],
        scripts: impl ScriptProvider + 'static,
    ) -> SchemaLifecycle {
        let config = StoreConfig::new(dir.path().join("GeoCache.db"));
        let retry = RetryPolicy::new(&config.retry, CancelFlag::new());
        SchemaLifecycle::new(
            config,
            VersionHistory::new(versions.iter().copied()).unwrap(),
            Arc::new(scripts),
            retry,
        )
    }

    /// Bundled scripts whose first lookup parks until released, while the
    /// caller holds its write transaction.
    struct GatedScripts {
        inner: MemoryScripts,
        armed: AtomicBool,
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl ScriptProvider for GatedScripts {
        fn script(&self, name: &str) -> Result<Option<String>, CoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.wait();
                self.release.wait();
            }
            self.inner.script(name)
        }
    }

    #[test]
    fn bundled_scripts_cover_bundled_history() {
        let history = bundled_history().unwrap();
        let scripts = bundled_scripts();
        for version in history.versions() {
            assert!(scripts.script(&create_script_name(version)).unwrap().is_some());
        }
        for step in history.steps(SCHEMA_VERSIONS[0], history.current()) {
            assert!(scripts.script(&step.script_name()).unwrap().is_some());
        }
    }

    #[test]
    fn fresh_store_is_created_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(&dir, &SCHEMA_VERSIONS, bundled_scripts());
        assert_eq!(lifecycle.state(), SchemaState::Uninitialized);
        assert_eq!(lifecycle.stored_version().unwrap(), None);

        let outcome = lifecycle.prepare().unwrap();
        assert_eq!(outcome, PrepareOutcome::Created { version: "1.1".into() });
        assert_eq!(lifecycle.state(), SchemaState::Ready);
        assert_eq!(lifecycle.stored_version().unwrap().as_deref(), Some("1.1"));
    }

    #[test]
    fn unknown_stored_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = MemoryScripts::new().with("create_0.9", "CREATE TABLE a (x);");
        let old = lifecycle(&dir, &["0.9"], scripts);
        old.prepare().unwrap();

        let current = lifecycle(&dir, &SCHEMA_VERSIONS, bundled_scripts());
        let err = current.prepare().unwrap_err();
        assert!(matches!(err, StorageError::UnknownVersion(v) if v == "0.9"));
        assert_eq!(current.state(), SchemaState::Failed);
    }

    #[test]
    fn store_ahead_of_history_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let newer = lifecycle(&dir, &SCHEMA_VERSIONS, bundled_scripts());
        newer.prepare().unwrap();

        let older = lifecycle(&dir, &["1.0"], bundled_scripts());
        let err = older.prepare().unwrap_err();
        assert!(matches!(err, StorageError::UnknownVersion(v) if v == "1.1"));
        assert_eq!(older.stored_version().unwrap().as_deref(), Some("1.1"));
    }

    #[test]
    fn concurrent_preparers_create_once() {
        let dir = tempfile::tempdir().unwrap();
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let gated = GatedScripts {
            inner: bundled_scripts(),
            armed: AtomicBool::new(true),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        };
        let first = lifecycle(&dir, &SCHEMA_VERSIONS, gated);
        let second = lifecycle(&dir, &SCHEMA_VERSIONS, bundled_scripts());

        let creator = thread::spawn(move || first.prepare());
        entered.wait();
        let waiter = thread::spawn(move || second.prepare());
        thread::sleep(Duration::from_millis(100));
        release.wait();

        let created = creator.join().unwrap().unwrap();
        let current = waiter.join().unwrap().unwrap();
        assert_eq!(created, PrepareOutcome::Created { version: "1.1".into() });
        assert_eq!(current, PrepareOutcome::Current { version: "1.1".into() });
    }
}
