use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StorageError;

/// Opens a fresh connection to the store file, creating the file if needed.
///
/// The connection belongs to the caller's single operation and is closed when
/// dropped.
pub fn open_connection(config: &StoreConfig) -> Result<Connection, StorageError> {
    let conn = Connection::open(&config.path)?;
    apply_pragmas(&conn, config)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> Result<(), StorageError> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = {};",
        config.journal_mode.pragma_value()
    ))?;
    conn.execute_batch(&format!(
        "PRAGMA synchronous = {};",
        config.sync_mode.pragma_value()
    ))?;
    Ok(())
}

/// Deletes the store file along with its `-wal`, `-shm` and `-journal`
/// siblings. Files that do not exist are skipped.
pub fn erase_store(path: &Path) -> Result<(), StorageError> {
    let mut targets = vec![path.to_path_buf()];
    targets.extend(["-wal", "-shm", "-journal"].map(|suffix| sibling(path, suffix)));
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => debug!(path = %target.display(), "removed store file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalMode;

    #[test]
    fn open_applies_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("GeoCache.db"));
        let conn = open_connection(&config).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn erase_removes_store_and_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GeoCache.db");
        {
            let conn = open_connection(&StoreConfig::new(&path)).unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }
        std::fs::write(sibling(&path, "-wal"), b"").unwrap();
        assert!(path.exists());

        erase_store(&path).unwrap();
        assert!(!path.exists());
        assert!(!sibling(&path, "-wal").exists());
        assert!(!sibling(&path, "-shm").exists());
    }

    #[test]
    fn erase_missing_store_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        erase_store(&dir.path().join("absent.db")).unwrap();
    }

    #[test]
    fn delete_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::new(dir.path().join("GeoCache.db"));
        config.journal_mode = JournalMode::Delete;
        let conn = open_connection(&config).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "delete");
    }
}
