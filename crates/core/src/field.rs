use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;
use crate::CoreError;

/// The writable columns of the record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldName {
    Name,
    Notes,
    Street,
    City,
    State,
    Area,
    Country,
    Lat,
    Lon,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Real,
    Timestamp,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Real => "numeric",
            Self::Timestamp => "timestamp",
        }
    }
}

impl FieldName {
    pub const ALL: [FieldName; 10] = [
        Self::Name,
        Self::Notes,
        Self::Street,
        Self::City,
        Self::State,
        Self::Area,
        Self::Country,
        Self::Lat,
        Self::Lon,
        Self::Timestamp,
    ];

    /// Fields every inserted record must carry.
    pub const REQUIRED: [FieldName; 4] = [Self::Name, Self::Lat, Self::Lon, Self::Timestamp];

    /// Column name in the record table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Notes => "Notes",
            Self::Street => "Street",
            Self::City => "City",
            Self::State => "State",
            Self::Area => "Area",
            Self::Country => "Country",
            Self::Lat => "Lat",
            Self::Lon => "Lon",
            Self::Timestamp => "Timestamp",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Lat | Self::Lon => FieldKind::Real,
            Self::Timestamp => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl FromStr for FieldName {
    type Err = CoreError;

    /// Accepts column names case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.column().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Real(f64),
    Timestamp(Timestamp),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.total_cmp(b).is_eq(),
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Real(_) => FieldKind::Real,
            Self::Timestamp(_) => FieldKind::Timestamp,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

/// A set of column assignments for an insert or update.
///
/// Every value is checked against its column's kind when it is added through
/// [`RecordFields::set`]; the typed builder methods cannot produce a kind
/// mismatch. Numeric values are checked for finiteness by
/// [`RecordFields::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFields {
    fields: BTreeMap<FieldName, FieldValue>,
}

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loosely-typed `(column, value)` pairs. Unknown column names
    /// and kind mismatches are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let mut fields = Self::new();
        for (key, value) in pairs {
            let name: FieldName = key.as_ref().parse()?;
            fields.set(name, value)?;
        }
        Ok(fields)
    }

    pub fn set(
        &mut self,
        name: FieldName,
        value: impl Into<FieldValue>,
    ) -> Result<&mut Self, CoreError> {
        let value = value.into();
        if value.kind() != name.kind() {
            return Err(CoreError::FieldType {
                field: name.column(),
                expected: name.kind().as_str(),
            });
        }
        self.fields.insert(name, value);
        Ok(self)
    }

    fn with(mut self, name: FieldName, value: FieldValue) -> Self {
        self.fields.insert(name, value);
        self
    }

    pub fn name(self, value: impl Into<String>) -> Self {
        self.with(FieldName::Name, FieldValue::Text(value.into()))
    }

    pub fn notes(self, value: impl Into<String>) -> Self {
        self.with(FieldName::Notes, FieldValue::Text(value.into()))
    }

    pub fn street(self, value: impl Into<String>) -> Self {
        self.with(FieldName::Street, FieldValue::Text(value.into()))
    }

    pub fn city(self, value: impl Into<String>) -> Self {
        self.with(FieldName::City, FieldValue::Text(value.into()))
    }

    pub fn state(self, value: impl Into<String>) -> Self {
        self.with(FieldName::State, FieldValue::Text(value.into()))
    }

    pub fn area(self, value: impl Into<String>) -> Self {
        self.with(FieldName::Area, FieldValue::Text(value.into()))
    }

    pub fn country(self, value: impl Into<String>) -> Self {
        self.with(FieldName::Country, FieldValue::Text(value.into()))
    }

    pub fn lat(self, value: f64) -> Self {
        self.with(FieldName::Lat, FieldValue::Real(value))
    }

    pub fn lon(self, value: f64) -> Self {
        self.with(FieldName::Lon, FieldValue::Real(value))
    }

    pub fn timestamp(self, value: Timestamp) -> Self {
        self.with(FieldName::Timestamp, FieldValue::Timestamp(value))
    }

    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.fields.get(&name)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Assignments in column order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    /// Checks a non-empty assignment set with finite coordinates.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fields.is_empty() {
            return Err(CoreError::EmptyFields);
        }
        for (name, value) in &self.fields {
            if let FieldValue::Real(n) = value {
                if !n.is_finite() {
                    return Err(CoreError::InvalidValue(format!("{name} must be finite, got {n}")));
                }
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus presence of every required field.
    pub fn validate_for_insert(&self) -> Result<(), CoreError> {
        self.validate()?;
        match FieldName::REQUIRED.into_iter().find(|f| !self.contains(*f)) {
            Some(missing) => Err(CoreError::MissingField(missing.column())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RecordFields {
        RecordFields::new()
            .name("Joe Blow")
            .lat(1.234)
            .lon(5.678)
            .timestamp(Timestamp::from_ymd_hms(2017, 7, 26, 12, 0, 0).unwrap())
    }

    #[test]
    fn parse_field_names() {
        assert_eq!("Name".parse::<FieldName>().unwrap(), FieldName::Name);
        assert_eq!("lat".parse::<FieldName>().unwrap(), FieldName::Lat);
        assert_eq!("TIMESTAMP".parse::<FieldName>().unwrap(), FieldName::Timestamp);
        assert!(matches!(
            "Altitude".parse::<FieldName>(),
            Err(CoreError::UnknownField(name)) if name == "Altitude"
        ));
    }

    #[test]
    fn column_kinds() {
        assert_eq!(FieldName::Street.kind(), FieldKind::Text);
        assert_eq!(FieldName::Lon.kind(), FieldKind::Real);
        assert_eq!(FieldName::Timestamp.kind(), FieldKind::Timestamp);
        assert!(FieldName::Name.is_required());
        assert!(!FieldName::Notes.is_required());
    }

    #[test]
    fn set_rejects_kind_mismatch() {
        let mut fields = RecordFields::new();
        let err = fields.set(FieldName::Lat, "north").unwrap_err();
        assert!(matches!(err, CoreError::FieldType { field: "Lat", .. }));
        let err = fields.set(FieldName::Name, 4.0).unwrap_err();
        assert!(matches!(err, CoreError::FieldType { field: "Name", .. }));
        assert!(fields.is_empty());
    }

    #[test]
    fn from_pairs_rejects_unknown_columns() {
        let result = RecordFields::from_pairs([
            ("Name", FieldValue::from("Lego Art Sale")),
            ("Elevation", FieldValue::from(12.0)),
        ]);
        assert!(matches!(result, Err(CoreError::UnknownField(name)) if name == "Elevation"));
    }

    #[test]
    fn from_pairs_builds_typed_fields() {
        let fields = RecordFields::from_pairs([
            ("Name", FieldValue::from("Lego Art Sale")),
            ("Lat", FieldValue::from(27.95)),
        ])
        .unwrap();
        assert_eq!(fields.get(FieldName::Name).and_then(|v| v.as_text()), Some("Lego Art Sale"));
        assert_eq!(fields.get(FieldName::Lat).and_then(|v| v.as_real()), Some(27.95));
    }

    #[test]
    fn accessors_match_only_their_kind() {
        let ts = Timestamp::from_ymd_hms(2017, 7, 26, 12, 0, 0).unwrap();
        let value = FieldValue::from(ts);
        assert_eq!(value.kind(), FieldKind::Timestamp);
        assert_eq!(value.as_timestamp(), Some(ts));
        assert_eq!(value.as_text(), None);
        assert_eq!(FieldValue::from("noon").as_timestamp(), None);
        assert_eq!(FieldValue::from(1.5).as_timestamp(), None);
    }

    #[test]
    fn iteration_follows_column_order() {
        let fields = complete().city("Tampa").notes("None");
        let columns: Vec<_> = fields.iter().map(|(name, _)| name.column()).collect();
        assert_eq!(columns, ["Name", "Notes", "City", "Lat", "Lon", "Timestamp"]);
    }

    #[test]
    fn insert_requires_core_fields() {
        assert!(complete().validate_for_insert().is_ok());

        let partial = RecordFields::new().name("x").lat(1.0).lon(2.0);
        assert!(matches!(
            partial.validate_for_insert(),
            Err(CoreError::MissingField("Timestamp"))
        ));
        assert!(matches!(
            RecordFields::new().validate_for_insert(),
            Err(CoreError::EmptyFields)
        ));
    }

    #[test]
    fn non_finite_coordinates_rejected() {
        let fields = complete().lat(f64::NAN);
        assert!(matches!(fields.validate(), Err(CoreError::InvalidValue(_))));
        let fields = RecordFields::new().lon(f64::INFINITY);
        assert!(matches!(fields.validate(), Err(CoreError::InvalidValue(_))));
    }
}
