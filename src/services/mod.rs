//! Typed wrappers over the hotel backend resources.
//!
//! Payloads come back either bare or wrapped in `{ "data": … }`, and
//! numeric fields are sometimes sent as strings; the helpers here absorb
//! both.

pub mod booking;
pub mod utility;

pub use booking::{
    Booking, BookingActivity, BookingDetails, BookingService, BookingSummary, BookingTab,
    DailyBookingData, StatusFilter,
};
pub use utility::{
    ChartData, UtilityCategory, UtilityDraft, UtilityItem, UtilityService, UtilityUser,
};

use crate::api::{data_or_self, Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Decode a payload, unwrapping a `data` envelope first.
pub(crate) fn from_payload<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(data_or_self(value))
        .map_err(|e| Error::InvalidServerResponse(e.to_string()))
}

/// Like [`from_payload`], but an absent list decodes as empty.
pub(crate) fn list_payload<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    match data_or_self(value) {
        Value::Null => Ok(Vec::new()),
        other => from_payload(other),
    }
}

/// Calendar date prefix of a backend date or timestamp.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Backend timestamps arrive as RFC 3339 or `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Whole nights between check-in and check-out.
pub(crate) fn nights_between(check_in: &str, check_out: &str) -> Option<i64> {
    let start = parse_date(check_in)?;
    let end = parse_date(check_out)?;
    Some((end - start).num_days().abs())
}

// ── Lenient field decoding ──────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Number(f64),
    Text(String),
}

fn loose<'de, D>(deserializer: D) -> std::result::Result<Option<Loose>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Loose>::deserialize(deserializer).unwrap_or(None))
}

/// Number or numeric string; anything else is `0`.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match loose(deserializer)? {
        Some(Loose::Number(n)) => n,
        Some(Loose::Text(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Loose::Bool(b)) => f64::from(u8::from(b)),
        None => 0.0,
    })
}

/// Integer or integer string; anything else is `0`.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer).map(|n| n as i64)
}

/// String, or the textual form of a number; `null` is empty.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match loose(deserializer)? {
        Some(Loose::Text(s)) => s,
        Some(Loose::Number(n)) if n.fract() == 0.0 => format!("{}", n as i64),
        Some(Loose::Number(n)) => n.to_string(),
        Some(Loose::Bool(b)) => b.to_string(),
        None => String::new(),
    })
}
