//! Serde helpers for timestamps stored by older writers.
//!
//! Documents written over the life of the product carry timestamps either as
//! RFC 3339 strings or as native BSON dates. Both are accepted on read;
//! writes always use RFC 3339 with millisecond precision.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use mongodb::bson;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Bson(bson::DateTime),
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// The stored text form of a timestamp.
pub fn to_stored(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match date {
        Some(dt) => serializer.serialize_some(&to_stored(*dt)),
        None => serializer.serialize_none(),
    }
}

/// Unreadable values degrade to `None` rather than failing the document.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTimestamp> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Text(text)) => parse_text(&text),
        Some(RawTimestamp::Bson(dt)) => Some(dt.to_chrono()),
        None => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCalendarDate {
    Text(String),
    Bson(bson::DateTime),
    Other(IgnoredAny),
}

/// Reads a `dueDate`. Native BSON dates become their UTC calendar date;
/// values of any other type are dropped.
pub fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawCalendarDate> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawCalendarDate::Text(text)) => Some(text),
        Some(RawCalendarDate::Bson(dt)) => {
            Some(dt.to_chrono().date_naive().format("%Y-%m-%d").to_string())
        }
        Some(RawCalendarDate::Other(_)) => {
            tracing::warn!("Ignoring unreadable dueDate");
            None
        }
        None => None,
    })
}
