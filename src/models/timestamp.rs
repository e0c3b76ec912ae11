//! UTC timestamps, stored and emitted as fixed-width RFC 3339 with
//! millisecond precision so that text order matches time order.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time at stored precision, so a returned record equals its
/// stored copy.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Only four-digit years keep the fixed-width text form.
fn storable(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (0..=9999)
        .contains(&ts.year())
        .then(|| ts.trunc_subsecs(3))
}

/// Parse a client-supplied timestamp: RFC 3339, `YYYY-MM-DD`,
/// `YYYY-MM-DDTHH:MM:SS[.fff]`, or epoch milliseconds. Years outside
/// 0..=9999 are rejected.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let ts = if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        Some(ts.with_timezone(&Utc))
    } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        Some(dt.and_utc())
    } else {
        s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
    };
    ts.and_then(storable)
}

pub fn from_json(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .and_then(storable),
        _ => None,
    }
}

/// Read a stored column back. Anything `format` did not write is a
/// conversion error on column `idx`.
pub fn from_sql(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("invalid timestamp: {s}").into())
    })
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}")))
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&format(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
            None => Ok(None),
        }
    }
}
