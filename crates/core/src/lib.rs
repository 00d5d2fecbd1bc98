pub mod error;
pub mod field;
pub mod record;
pub mod script;
pub mod timestamp;
pub mod version;

pub use error::CoreError;
pub use field::{FieldKind, FieldName, FieldValue, RecordFields};
pub use record::{Record, RecordId, RecordSummary};
pub use script::{DirScripts, MemoryScripts, Script, ScriptProvider};
pub use timestamp::Timestamp;
pub use version::{MigrationStep, VersionHistory};
