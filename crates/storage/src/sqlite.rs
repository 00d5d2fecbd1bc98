use geocache_core::record::format_address;
use geocache_core::{FieldValue, Record, RecordFields, RecordId, RecordSummary, Timestamp};
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::config::StoreConfig;
use crate::connection::open_connection;
use crate::error::StorageError;
use crate::retry::RetryPolicy;
use crate::traits::{RecordFilter, RecordStore};

const SUMMARY_COLUMNS: &str = "Id, Name, Street, City, State, Country, Lat, Lon, Timestamp";
const DETAIL_COLUMNS: &str =
    "Id, Name, Notes, Street, City, State, Area, Country, Lat, Lon, Timestamp";
const LISTING_ORDER: &str = "ORDER BY Timestamp DESC, Id DESC";

/// Record persistence over the `GeoCache` table. Every call opens its own
/// connection and closes it before returning.
pub struct SqliteRecordStore {
    config: StoreConfig,
    retry: RetryPolicy,
}

impl SqliteRecordStore {
    pub fn new(config: StoreConfig, retry: RetryPolicy) -> Self {
        Self { config, retry }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs a statement that changes rows, returning the number changed and
    /// the last inserted row id.
    fn write(
        &self,
        operation: &str,
        sql: &str,
        values: &[Value],
    ) -> Result<(usize, i64), StorageError> {
        self.retry.run(operation, || {
            let conn = open_connection(&self.config)?;
            let changed = conn.execute(sql, params_from_iter(values.iter()))?;
            Ok((changed, conn.last_insert_rowid()))
        })
    }

    fn list(
        &self,
        operation: &str,
        sql: &str,
        values: &[Value],
    ) -> Result<Vec<RecordSummary>, StorageError> {
        self.retry.run(operation, || {
            let conn = open_connection(&self.config)?;
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), read_summary)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn bind_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Real(n) => Value::Real(*n),
        FieldValue::Timestamp(t) => Value::Text(t.to_string()),
    }
}

fn text(row: &rusqlite::Row, index: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(index)?.unwrap_or_default())
}

fn timestamp(row: &rusqlite::Row, index: usize) -> rusqlite::Result<Timestamp> {
    let raw: String = row.get(index)?;
    Timestamp::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn read_summary(row: &rusqlite::Row) -> rusqlite::Result<RecordSummary> {
    let street = text(row, 2)?;
    let city = text(row, 3)?;
    let state = text(row, 4)?;
    let country = text(row, 5)?;
    Ok(RecordSummary {
        id: RecordId::new(row.get(0)?),
        name: text(row, 1)?,
        lat: row.get(6)?,
        lon: row.get(7)?,
        timestamp: timestamp(row, 8)?,
        address: format_address(&street, &city, &state, &country),
    })
}

fn read_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        id: RecordId::new(row.get(0)?),
        name: text(row, 1)?,
        notes: text(row, 2)?,
        street: text(row, 3)?,
        city: text(row, 4)?,
        state: text(row, 5)?,
        area: text(row, 6)?,
        country: text(row, 7)?,
        lat: row.get(8)?,
        lon: row.get(9)?,
        timestamp: timestamp(row, 10)?,
    })
}

/// Builds the `WHERE` clause and its bound values for a filter.
fn filter_clause(filter: &RecordFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if !filter.tags.is_empty() {
        let first = values.len() + 1;
        let placeholders = (first..first + filter.tags.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!(
            "Id IN (SELECT Id FROM Tags WHERE Tag IN ({placeholders}))"
        ));
        values.extend(filter.tags.iter().cloned().map(Value::Text));
    }
    if let Some(from) = filter.from {
        values.push(Value::Text(from.to_string()));
        clauses.push(format!("Timestamp >= ?{}", values.len()));
    }
    if let Some(to) = filter.to {
        values.push(Value::Text(to.to_string()));
        clauses.push(format!("Timestamp <= ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, fields: &RecordFields) -> Result<RecordId, StorageError> {
        fields.validate_for_insert()?;

        let columns: Vec<&str> = fields.iter().map(|(name, _)| name.column()).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let values: Vec<Value> = fields.iter().map(|(_, value)| bind_value(value)).collect();
        let sql = format!(
            "INSERT INTO GeoCache ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let (_, rowid) = self.write("insert", &sql, &values)?;
        debug!(id = rowid, "inserted record");
        Ok(RecordId::new(rowid))
    }

    fn select_all(&self) -> Result<Vec<RecordSummary>, StorageError> {
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM GeoCache {LISTING_ORDER}");
        self.list("select_all", &sql, &[])
    }

    fn select_filtered(&self, filter: &RecordFilter) -> Result<Vec<RecordSummary>, StorageError> {
        let (where_clause, values) = filter_clause(filter);
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM GeoCache {where_clause} {LISTING_ORDER}");
        debug!(?filter, "filtered listing");
        self.list("select_filtered", &sql, &values)
    }

    fn select_one(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        let sql = format!("SELECT {DETAIL_COLUMNS} FROM GeoCache WHERE Id = ?1");
        self.retry.run("select_one", || {
            let conn = open_connection(&self.config)?;
            let record = conn
                .query_row(&sql, params![id.get()], read_record)
                .optional()?;
            Ok(record)
        })
    }

    fn update(&self, id: RecordId, fields: &RecordFields) -> Result<(), StorageError> {
        fields.validate()?;

        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", name.column(), i + 1))
            .collect();
        let mut values: Vec<Value> = fields.iter().map(|(_, value)| bind_value(value)).collect();
        values.push(Value::Integer(id.get()));
        let sql = format!(
            "UPDATE GeoCache SET {} WHERE Id = ?{}",
            assignments.join(", "),
            values.len()
        );

        let (changed, _) = self.write("update", &sql, &values)?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("record {id}")));
        }
        debug!(%id, fields = fields.len(), "updated record");
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<(), StorageError> {
        let (changed, _) = self.write(
            "delete",
            "DELETE FROM GeoCache WHERE Id = ?1",
            &[Value::Integer(id.get())],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("record {id}")));
        }
        debug!(%id, "deleted record");
        Ok(())
    }
}
