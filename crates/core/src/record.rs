use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Store-assigned row id of a record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct RecordId(i64);

impl RecordId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully detailed record, as returned by a point lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub notes: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub area: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Timestamp,
}

impl Record {
    pub fn address(&self) -> String {
        format_address(&self.street, &self.city, &self.state, &self.country)
    }
}

/// The listing shape: identity, position, time and a one-line address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Timestamp,
    pub address: String,
}

/// Formats `"<street>, <city> <state> <country>"`, leaving out empty parts.
pub fn format_address(street: &str, city: &str, state: &str, country: &str) -> String {
    let locality = [city, state, country]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let street = street.trim();
    match (street.is_empty(), locality.is_empty()) {
        (false, false) => format!("{street}, {locality}"),
        (false, true) => street.to_string(),
        (true, _) => locality,
    }
}
