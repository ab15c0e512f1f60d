use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{de, Deserialize, Deserializer, Serialize};
use time::{format_description::FormatItem, macros::format_description, Date};

/// The number of milliseconds since the [`UNIX_EPOCH`].
///
/// - Internally represented by a non-negative [`i64`] so it can be stored in
///   an SQLite INTEGER column without conversion.
/// - Can represent any time from January 1st, 1970 00:00:00.000 UTC to
///   roughly 292 million years in the future.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize,
)]
pub struct TimestampMs(i64);

impl TimestampMs {
    /// Creates a new [`TimestampMs`] from the current [`SystemTime`].
    ///
    /// Panics if the current time is not within bounds.
    pub fn now() -> Self {
        Self::try_from(SystemTime::now()).unwrap()
    }

    /// Returns the contained [`i64`].
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Construct from a raw non-negative milliseconds value.
    pub fn from_i64(millis: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(millis >= 0, "Unix timestamp must be non-negative");
        Ok(Self(millis))
    }

    /// This timestamp plus `duration`, saturating at the i64 boundary.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// The UTC calendar date this timestamp falls on.
    pub fn utc_date(self) -> Date {
        let odt = time::OffsetDateTime::from(SystemTime::from(self));
        odt.date()
    }
}

/// Get a [`SystemTime`] corresponding to this timestamp.
impl From<TimestampMs> for SystemTime {
    fn from(timestamp: TimestampMs) -> Self {
        let millis = u64::try_from(timestamp.0)
            .expect("Non-negative invariant was violated");
        UNIX_EPOCH + Duration::from_millis(millis)
    }
}

/// Attempts to convert a [`SystemTime`] into a [`TimestampMs`].
///
/// Returns an error if the [`SystemTime`] is not within bounds.
impl TryFrom<SystemTime> for TimestampMs {
    type Error = anyhow::Error;
    fn try_from(system_time: SystemTime) -> anyhow::Result<Self> {
        system_time
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis())
            .map(i64::try_from)
            .map(|res| res.map(Self))
            .context("Current time is before January 1st, 1970")?
            .context("Current time is more than 292 million years past epoch")
    }
}

/// Enforces that the inner [`i64`] is non-negative.
impl<'de> Deserialize<'de> for TimestampMs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        if value >= 0 {
            Ok(TimestampMs(value))
        } else {
            Err(de::Error::invalid_value(
                de::Unexpected::Signed(value),
                &"Unix timestamp must be non-negative",
            ))
        }
    }
}

/// `YYYY-MM-DD`, as stored in TEXT columns and used in the HTTP API.
const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> anyhow::Result<Date> {
    Date::parse(s, DATE_FORMAT)
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
}

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .expect("YYYY-MM-DD formatting is infallible")
}

/// Format a calendar date as compact `YYYYMMDD` (used in document numbers).
pub fn format_date_compact(date: Date) -> String {
    date.format(format_description!("[year][month][day]"))
        .expect("YYYYMMDD formatting is infallible")
}

/// Serde for `Option<Date>` as an optional `YYYY-MM-DD` string.
pub mod serde_opt_date {
    use super::*;

    pub fn serialize<S>(
        date: &Option<Date>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&format_date(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let maybe_s = Option::<String>::deserialize(deserializer)?;
        match maybe_s {
            Some(s) => parse_date(&s).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Serde for `Date` as a `YYYY-MM-DD` string.
pub mod serde_date {
    use super::*;

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_date(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use proptest::{prop_assert_eq, proptest};
    use time::macros::date;

    use super::*;

    #[test]
    fn timestamp_json_roundtrip() {
        proptest!(|(millis in 0..i64::MAX)| {
            let ts1 = TimestampMs::from_i64(millis).unwrap();
            let json = serde_json::to_string(&ts1).unwrap();
            let ts2 = serde_json::from_str::<TimestampMs>(&json).unwrap();
            prop_assert_eq!(ts1, ts2);
        });
    }

    #[test]
    fn deserialize_enforces_nonnegative() {
        assert_eq!(serde_json::from_str::<TimestampMs>("42").unwrap().0, 42);
        assert_eq!(serde_json::from_str::<TimestampMs>("0").unwrap().0, 0);
        assert!(serde_json::from_str::<TimestampMs>("-42").is_err());
    }

    #[test]
    fn date_parse_format() {
        let d = parse_date("2024-02-01").unwrap();
        assert_eq!(d, date!(2024 - 02 - 01));
        assert_eq!(format_date(d), "2024-02-01");
        assert_eq!(format_date_compact(d), "20240201");
        assert!(parse_date("01/02/2024").is_err());
        assert!(parse_date("2024-13-01").is_err());
    }
}
