use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::CoreError;

/// A second-resolution wall-clock timestamp, stored as `yyyy-MM-ddTHH:mm:ss`.
///
/// The stored text sorts lexicographically in chronological order, which is
/// what `ORDER BY Timestamp` and the date-range filters rely on.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    /// Current UTC time truncated to whole seconds.
    pub fn now() -> Result<Self, CoreError> {
        let now = OffsetDateTime::now_utc();
        let time = now
            .time()
            .replace_nanosecond(0)
            .map_err(|e| CoreError::InvalidTimestamp(e.to_string()))?;
        Ok(Self(PrimitiveDateTime::new(now.date(), time)))
    }

    pub fn from_ymd_hms(
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, CoreError> {
        let month =
            Month::try_from(month).map_err(|e| CoreError::InvalidTimestamp(e.to_string()))?;
        let date = Date::from_calendar_date(year, month, day)
            .map_err(|e| CoreError::InvalidTimestamp(e.to_string()))?;
        let time = Time::from_hms(hour, minute, second)
            .map_err(|e| CoreError::InvalidTimestamp(e.to_string()))?;
        Ok(Self(PrimitiveDateTime::new(date, time)))
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
        .map(Self)
        .map_err(|e| CoreError::InvalidTimestamp(format!("{s}: {e}")))
    }

    pub fn as_datetime(&self) -> PrimitiveDateTime {
        self.0
    }
}

impl From<PrimitiveDateTime> for Timestamp {
    fn from(value: PrimitiveDateTime) -> Self {
        // Sub-second precision is not representable in the stored text.
        Self(value.replace_nanosecond(0).unwrap_or(value))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Timestamp::parse(&text).map_err(serde::de::Error::custom)
    }
}
