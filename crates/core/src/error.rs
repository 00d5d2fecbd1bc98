use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field {field} expects a {expected} value")]
    FieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("no fields supplied")]
    EmptyFields,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid version history: {0}")]
    InvalidVersionHistory(String),

    #[error("script not found: {0}")]
    ScriptMissing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
