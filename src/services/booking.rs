use super::{
    from_payload, lenient_f64, lenient_i64, lenient_string, list_payload, nights_between,
    parse_timestamp,
};
use crate::api::{ApiClient, Result};
use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

// ── Daily booking details ───────────────────────────────────────

/// A reservation in the daily front-desk view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Booking {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub first_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub last_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub checking_date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub checkout_date: String,
    pub checking_time: Option<String>,
    pub checkout_time: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub adults: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub children: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub room_count: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub breakfast: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_amount: f64,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    pub checking_status: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub passport: Option<String>,
    pub booking_type: Option<String>,
    pub booking_method: Option<String>,
    pub booking_date: Option<String>,
    pub reservation: Option<Value>,
}

impl Booking {
    pub fn guest_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn nights(&self) -> Option<i64> {
        nights_between(&self.checking_date, &self.checkout_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingSummary {
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub available_rooms: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub arrivals_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub departures_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub in_house_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub pending_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub checkout_room_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub staying_room_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingDetails {
    pub arrivals: Vec<Booking>,
    pub departures: Vec<Booking>,
    pub in_house: Vec<Booking>,
    pub pending: Vec<Booking>,
}

/// Response of `/hotel/daily-booking-details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyBookingData {
    pub summary: BookingSummary,
    pub details: BookingDetails,
}

impl DailyBookingData {
    pub fn tab(&self, tab: BookingTab) -> &[Booking] {
        match tab {
            BookingTab::Arrivals => &self.details.arrivals,
            BookingTab::Departures => &self.details.departures,
            BookingTab::InHouse => &self.details.in_house,
            BookingTab::Pending => &self.details.pending,
        }
    }

    /// Count reported by the summary for `tab`.
    pub fn count(&self, tab: BookingTab) -> i64 {
        match tab {
            BookingTab::Arrivals => self.summary.arrivals_count,
            BookingTab::Departures => self.summary.departures_count,
            BookingTab::InHouse => self.summary.in_house_count,
            BookingTab::Pending => self.summary.pending_count,
        }
    }
}

/// Section of the daily view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingTab {
    #[default]
    Arrivals,
    Departures,
    InHouse,
    /// Labelled "All Active" in the app.
    Pending,
}

impl BookingTab {
    pub const ALL: [BookingTab; 4] = [
        Self::Arrivals,
        Self::Departures,
        Self::InHouse,
        Self::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arrivals => "arrivals",
            Self::Departures => "departures",
            Self::InHouse => "in_house",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for BookingTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingTab {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "arrivals" => Ok(Self::Arrivals),
            "departures" => Ok(Self::Departures),
            "in_house" | "inhouse" => Ok(Self::InHouse),
            "pending" | "active" => Ok(Self::Pending),
            other => {
                bail!("Unknown tab '{other}' (expected arrivals, departures, in_house or pending)")
            }
        }
    }
}

// ── Booking status feed ─────────────────────────────────────────

/// Booking status change, as listed in the activity feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingActivity {
    #[serde(deserialize_with = "lenient_string")]
    pub booking_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub customer_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub customer_phone: String,
    #[serde(deserialize_with = "lenient_string")]
    pub customer_email: String,
    #[serde(deserialize_with = "lenient_string")]
    pub checkin_date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub checkout_date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub updated_at: String,
}

impl BookingActivity {
    pub fn nights(&self) -> Option<i64> {
        nights_between(&self.checkin_date, &self.checkout_date)
    }
}

/// Status filter for the activity feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Confirmed,
    Pending,
    Cancelled,
    Deleted,
}

impl StatusFilter {
    pub fn matches(&self, status: &str) -> bool {
        match self {
            Self::All => true,
            other => status.trim().eq_ignore_ascii_case(other.as_str()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Confirmed => "confirmed",
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "confirmed" => Ok(Self::Confirmed),
            "pending" => Ok(Self::Pending),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "deleted" => Ok(Self::Deleted),
            other => bail!("Unknown status filter '{other}'"),
        }
    }
}

/// Newest first; unparseable timestamps sink to the end.
fn sort_newest_first(items: &mut [BookingActivity]) {
    items.sort_by_key(|item| Reverse(parse_timestamp(&item.created_at)));
}

// ── Service ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BookingService {
    api: ApiClient,
}

impl BookingService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Summary and per-tab bookings for one day.
    pub async fn daily_booking_details(&self, date: NaiveDate) -> Result<DailyBookingData> {
        let query = [("date", date.format("%Y-%m-%d").to_string())];
        let value: Value = self.api.get_json("/hotel/daily-booking-details", &query).await?;
        from_payload(value)
    }

    /// Booking status changes, newest first.
    pub async fn status_feed(&self, filter: StatusFilter) -> Result<Vec<BookingActivity>> {
        let value: Value = self.api.get_json("/hotel/notifications", &[]).await?;
        let mut items: Vec<BookingActivity> = list_payload(value)?;
        sort_newest_first(&mut items);
        items.retain(|item| filter.matches(&item.status));
        tracing::debug!(count = items.len(), filter = filter.as_str(), "Loaded booking feed");
        Ok(items)
    }
}
