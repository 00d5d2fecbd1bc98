use std::collections::BTreeSet;

use geocache_core::{Record, RecordFields, RecordId, RecordSummary, Timestamp};

use crate::error::StorageError;

/// Restricts a listing to records carrying any of `tags` and lying within
/// the inclusive `from..=to` time range. Empty parts do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub tags: BTreeSet<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn since(mut self, from: Timestamp) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: Timestamp) -> Self {
        self.to = Some(to);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.from.is_none() && self.to.is_none()
    }
}

/// Persistence operations over the record table.
pub trait RecordStore {
    fn insert(&self, fields: &RecordFields) -> Result<RecordId, StorageError>;

    /// All records, newest first.
    fn select_all(&self) -> Result<Vec<RecordSummary>, StorageError>;

    fn select_filtered(&self, filter: &RecordFilter) -> Result<Vec<RecordSummary>, StorageError>;

    fn select_one(&self, id: RecordId) -> Result<Option<Record>, StorageError>;

    /// Fails with [`StorageError::NotFound`] when no record has `id`.
    fn update(&self, id: RecordId, fields: &RecordFields) -> Result<(), StorageError>;

    /// Fails with [`StorageError::NotFound`] when no record has `id`.
    fn delete(&self, id: RecordId) -> Result<(), StorageError>;
}
