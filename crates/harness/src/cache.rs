use std::error::Error;
use std::path::PathBuf;

use geocache_core::{MemoryScripts, RecordFields, RecordId, Timestamp, VersionHistory};
use geocache_engine::GeoCache;
use geocache_storage::schema::bundled_scripts;
use geocache_storage::{RetryConfig, StoreConfig, open_connection};
use tempfile::TempDir;

pub type TestResult<T> = Result<T, Box<dyn Error>>;

/// A cache over a store file in its own temporary directory.
pub struct TestCache {
    pub cache: GeoCache,
    dir: TempDir,
}

impl TestCache {
    /// A prepared cache at the bundled schema version.
    pub fn new() -> TestResult<Self> {
        let test = Self::unprepared()?;
        test.cache.prepare()?;
        Ok(test)
    }

    pub fn unprepared() -> TestResult<Self> {
        let dir = tempfile::tempdir()?;
        let cache = GeoCache::open(store_config(&dir))?;
        Ok(Self { cache, dir })
    }

    /// An unprepared cache using the given history and scripts.
    pub fn with_scripts(versions: &[&str], scripts: MemoryScripts) -> TestResult<Self> {
        let dir = tempfile::tempdir()?;
        let cache = GeoCache::with_scripts(
            store_config(&dir),
            VersionHistory::new(versions.iter().copied())?,
            scripts,
        )?;
        Ok(Self { cache, dir })
    }

    /// A prepared cache whose store was created at `version` of the bundled
    /// history.
    pub fn at_version(version: &str) -> TestResult<Self> {
        let test = Self::with_scripts(&[version], bundled_scripts())?;
        test.cache.prepare()?;
        Ok(test)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("geocache.db")
    }

    pub fn config(&self) -> StoreConfig {
        store_config(&self.dir)
    }

    /// Swaps in a new, unprepared cache over the same store file.
    pub fn reopen(&mut self, versions: &[&str], scripts: MemoryScripts) -> TestResult<()> {
        self.cache = GeoCache::with_scripts(
            self.config(),
            VersionHistory::new(versions.iter().copied())?,
            scripts,
        )?;
        Ok(())
    }

    /// Swaps in a new cache with the given retry settings.
    pub fn reopen_with_retry(&mut self, retry: RetryConfig) -> TestResult<()> {
        self.cache = GeoCache::open(self.config().with_retry(retry))?;
        self.cache.prepare()?;
        Ok(())
    }

    /// A raw connection to the store, configured like the cache's own.
    pub fn connect(&self) -> TestResult<rusqlite::Connection> {
        Ok(open_connection(&self.config())?)
    }

    pub fn insert_sample(&self, name: &str, timestamp: Timestamp) -> TestResult<RecordId> {
        Ok(self.cache.insert(&sample(name, timestamp))?)
    }

    /// Attaches tags to a record directly in the `Tags` table.
    pub fn tag(&self, id: RecordId, tags: &[&str]) -> TestResult<()> {
        let conn = self.connect()?;
        for tag in tags {
            conn.execute(
                "INSERT INTO Tags (Id, Tag) VALUES (?1, ?2)",
                rusqlite::params![id.get(), tag],
            )?;
        }
        Ok(())
    }

    pub fn table_exists(&self, table: &str) -> TestResult<bool> {
        let conn = self.connect()?;
        let exists = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn count(&self, table: &str) -> TestResult<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

fn store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("geocache.db")).with_retry(test_retry())
}

/// Short backoff so busy tests finish quickly.
pub fn test_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_backoff_ms: 5,
        max_backoff_ms: 40,
        timeout_ms: 2_000,
    }
}

/// A record with every required field and a few address parts.
pub fn sample(name: &str, timestamp: Timestamp) -> RecordFields {
    RecordFields::new()
        .name(name)
        .street("1 Main St")
        .city("Springfield")
        .state("IL")
        .country("USA")
        .lat(39.78)
        .lon(-89.65)
        .timestamp(timestamp)
}

pub fn at(year: i32, month: u8, day: u8, hour: u8, minute: u8) -> Timestamp {
    match Timestamp::from_ymd_hms(year, month, day, hour, minute, 0) {
        Ok(ts) => ts,
        Err(e) => panic!("bad test timestamp: {e}"),
    }
}

/// Routes `tracing` output to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
