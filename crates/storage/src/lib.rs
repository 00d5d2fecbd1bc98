pub mod config;
pub mod connection;
pub mod error;
pub mod retry;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use config::{JournalMode, RetryConfig, StoreConfig, SyncMode};
pub use connection::{erase_store, open_connection};
pub use error::StorageError;
pub use retry::{CancelFlag, RetryPolicy};
pub use schema::{PrepareOutcome, SchemaLifecycle, SchemaState};
pub use sqlite::SqliteRecordStore;
pub use traits::*;
