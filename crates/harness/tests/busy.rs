use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use geocache_engine::{CacheError, CacheStatus};
use geocache_harness::{TestCache, TestResult, at, init_tracing, sample};
use geocache_storage::{RetryConfig, StorageError};

/// Takes the write lock on the store from a separate connection.
fn lock_store(test: &TestCache) -> TestResult<rusqlite::Connection> {
    let conn = test.connect()?;
    conn.execute_batch("BEGIN EXCLUSIVE;")?;
    Ok(conn)
}

#[test]
fn exhausted_retries_report_store_error() -> TestResult<()> {
    init_tracing();
    let test = TestCache::new()?;
    let lock = lock_store(&test)?;

    let result = test.cache.insert(&sample("Blocked", at(2017, 7, 26, 14, 3)));
    assert!(matches!(
        result,
        Err(CacheError::Storage(StorageError::Busy { attempts: 5 }))
    ));
    assert_eq!(CacheStatus::of(&result), CacheStatus::StoreError);

    lock.execute_batch("ROLLBACK;")?;
    assert_eq!(test.count("GeoCache")?, 0);
    Ok(())
}

#[test]
fn write_succeeds_once_lock_is_released() -> TestResult<()> {
    init_tracing();
    let mut test = TestCache::new()?;
    test.reopen_with_retry(RetryConfig {
        max_attempts: 40,
        initial_backoff_ms: 10,
        max_backoff_ms: 50,
        timeout_ms: 5_000,
    })?;

    let locked = Arc::new(Barrier::new(2));
    let holder = {
        let conn = lock_store(&test)?;
        let locked = Arc::clone(&locked);
        thread::spawn(move || {
            locked.wait();
            thread::sleep(Duration::from_millis(150));
            conn.execute_batch("COMMIT;")
        })
    };

    locked.wait();
    let id = test.cache.insert(&sample("Patient", at(2017, 7, 26, 14, 3)))?;
    holder.join().expect("lock holder panicked")?;

    assert_eq!(test.cache.select_one(id)?.expect("record").name, "Patient");
    Ok(())
}

#[test]
fn cancel_stops_waiting_on_a_busy_store() -> TestResult<()> {
    let mut test = TestCache::new()?;
    test.reopen_with_retry(RetryConfig {
        max_attempts: 1_000,
        initial_backoff_ms: 100,
        max_backoff_ms: 1_000,
        timeout_ms: 60_000,
    })?;
    let lock = lock_store(&test)?;

    let cancel = test.cache.cancel_flag();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let result = test.cache.insert(&sample("Abandoned", at(2017, 7, 26, 14, 3)));
    canceller.join().expect("canceller panicked");
    assert!(matches!(
        result,
        Err(CacheError::Storage(StorageError::Cancelled))
    ));
    assert_eq!(CacheStatus::of(&result), CacheStatus::StoreError);

    lock.execute_batch("ROLLBACK;")?;
    test.cache.cancel_flag().reset();
    test.insert_sample("Later", at(2017, 7, 27, 9, 0))?;
    assert_eq!(test.count("GeoCache")?, 1);
    Ok(())
}

#[test]
fn concurrent_writers_all_land() -> TestResult<()> {
    init_tracing();
    let mut test = TestCache::new()?;
    test.reopen_with_retry(RetryConfig {
        max_attempts: 100,
        initial_backoff_ms: 5,
        max_backoff_ms: 100,
        timeout_ms: 20_000,
    })?;
    let test = Arc::new(test);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let test = Arc::clone(&test);
            thread::spawn(move || -> Result<(), CacheError> {
                for i in 0..10u8 {
                    let name = format!("worker {worker} record {i}");
                    test.cache.insert(&sample(&name, at(2017, 7, 1, worker, i)))?;
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("writer panicked")?;
    }

    let listed = test.cache.select_all()?;
    assert_eq!(listed.len(), 40);
    let mut ids: Vec<_> = listed.iter().map(|s| s.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 40);
    Ok(())
}

#[test]
fn readers_see_committed_rows_while_a_writer_holds_the_lock() -> TestResult<()> {
    let test = TestCache::new()?;
    test.insert_sample("Visible", at(2017, 1, 1, 0, 0))?;
    let lock = lock_store(&test)?;
    lock.execute("DELETE FROM GeoCache", [])?;

    let listed = test.cache.select_all()?;
    assert_eq!(listed.len(), 1);
    lock.execute_batch("ROLLBACK;")?;
    Ok(())
}
