use super::{from_payload, lenient_f64, lenient_i64, lenient_string, list_payload, parse_date};
use crate::api::{ApiClient, Error, Result};
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

const FALLBACK_IMAGE_NAME: &str = "utility_image.jpg";
const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

// ── Records ─────────────────────────────────────────────────────

/// Metered utility (water, electricity, gas…) configured for the hotel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityCategory {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub utility_category_name: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub hotel_id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub is_visible: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub monthly_charj: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub unit_price: f64,
    #[serde(deserialize_with = "lenient_string")]
    pub average: String,
    #[serde(deserialize_with = "lenient_string")]
    pub difference: String,
    #[serde(deserialize_with = "lenient_string")]
    pub guest: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub range_date: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub point: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityUser {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub lname: String,
    #[serde(deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(deserialize_with = "lenient_string")]
    pub role: String,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub hotel_id: i64,
}

impl UtilityUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.lname).trim().to_string()
    }
}

/// One meter reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityItem {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub image: String,
    #[serde(deserialize_with = "lenient_string")]
    pub u_category: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub u_category_id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub startreading: String,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub hotel_id: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub user_id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub updated_at: String,
    pub deleted_at: Option<String>,
    pub user: Option<UtilityUser>,
}

impl UtilityItem {
    pub fn reading_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }
}

// ── Chart data ──────────────────────────────────────────────────

/// Per-day readings. Category columns are keyed by category name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyReading {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub guests: f64,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryChartData {
    pub category_name: Value,
    #[serde(deserialize_with = "lenient_string")]
    pub category_display_name: String,
    pub readings: Vec<DailyReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalCount {
    #[serde(deserialize_with = "lenient_f64")]
    pub total_count: f64,
    #[serde(deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub category_id: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub total_bill: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalBillCount {
    #[serde(deserialize_with = "lenient_f64")]
    pub total_bill_count: f64,
    #[serde(deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub category_id: i64,
    #[serde(rename = "total_BillReading", deserialize_with = "lenient_string")]
    pub total_bill_reading: String,
}

/// Consumption chart plus per-category totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartData {
    #[serde(rename = "chartData")]
    pub chart_data: Vec<CategoryChartData>,
    pub total_count: Vec<TotalCount>,
    pub total_bill_count: Vec<TotalBillCount>,
}

impl ChartData {
    pub fn total_for(&self, category: &str) -> Option<&TotalCount> {
        self.total_count.iter().find(|t| t.category == category)
    }

    pub fn bill_for(&self, category: &str) -> Option<&TotalBillCount> {
        self.total_bill_count.iter().find(|t| t.category == category)
    }
}

#[derive(Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<ChartData>,
}

// ── Drafts ──────────────────────────────────────────────────────

/// A reading about to be created or updated.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilityDraft {
    pub date: NaiveDate,
    pub category_id: i64,
    pub reading: String,
    /// Meter photo. Required for new readings.
    pub image: Option<PathBuf>,
}

impl UtilityDraft {
    /// Client-side checks run before anything is sent. `editing` is the id
    /// of the record being updated, if any.
    pub fn validate(&self, existing: &[UtilityItem], editing: Option<i64>) -> Result<()> {
        if self.reading.trim().is_empty() {
            return Err(Error::InvalidInput("Please enter meter reading".into()));
        }
        if editing.is_none() && self.image.is_none() {
            return Err(Error::InvalidInput("Please select an image".into()));
        }
        if self.category_id == 0 {
            return Err(Error::InvalidInput("Please select a category".into()));
        }

        let duplicate = existing.iter().any(|item| {
            item.reading_date() == Some(self.date)
                && item.u_category_id == self.category_id
                && Some(item.id) != editing
        });
        if duplicate {
            return Err(Error::InvalidInput(format!(
                "A utility reading for this category on {} already exists. \
                 Please choose a different date or category.",
                self.date.format("%b %-d, %Y")
            )));
        }
        Ok(())
    }
}

// ── Service ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UtilityService {
    api: ApiClient,
}

impl UtilityService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn categories(&self) -> Result<Vec<UtilityCategory>> {
        let value: Value = self.api.get_json("/utility/categories", &[]).await?;
        list_payload(value)
    }

    pub async fn list(&self) -> Result<Vec<UtilityItem>> {
        let value: Value = self.api.get_json("/utility", &[]).await?;
        list_payload(value)
    }

    pub async fn get(&self, id: i64) -> Result<UtilityItem> {
        let value: Value = self.api.get_json(&format!("/utility/{id}"), &[]).await?;
        from_payload(value)
    }

    /// Chart data, optionally for a specific day.
    pub async fn chart_data(&self, date: Option<NaiveDate>) -> Result<ChartData> {
        let query: Vec<(&str, String)> = date
            .map(|d| ("date", d.format("%Y-%m-%d").to_string()))
            .into_iter()
            .collect();
        let value: Value = self.api.get_json("/utility/chart-data", &query).await?;

        let envelope: ChartEnvelope =
            serde_json::from_value(value).map_err(|e| Error::InvalidServerResponse(e.to_string()))?;
        match envelope {
            ChartEnvelope {
                success: true,
                data: Some(data),
            } => Ok(data),
            _ => Err(Error::InvalidServerResponse("Invalid chart data response".into())),
        }
    }

    /// Create (`id == None`) or update a reading. The draft is validated
    /// against `existing` first.
    pub async fn save(
        &self,
        draft: &UtilityDraft,
        id: Option<i64>,
        existing: &[UtilityItem],
    ) -> Result<UtilityItem> {
        draft.validate(existing, id)?;

        let mut form = Form::new();
        if let Some(id) = id {
            form = form.text("id", id.to_string());
        }
        form = form
            .text("date", draft.date.format("%Y-%m-%d").to_string())
            .text("u_category", draft.category_id.to_string())
            .text("startreading", draft.reading.trim().to_string());
        if let Some(path) = &draft.image {
            form = form.part("utility_image", image_part(path).await?);
        }

        tracing::info!(
            ?id,
            date = %draft.date,
            category = draft.category_id,
            "Saving utility reading"
        );
        let value: Value = self.api.post_multipart("/utility/save", form).await?;
        from_payload(value)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.api.delete(&format!("/utility/{id}")).await?;
        tracing::info!(id, "Deleted utility reading");
        Ok(())
    }

    /// Absolute URL of a stored meter photo.
    pub fn image_url(&self, image: &str) -> Option<String> {
        let image = image.trim();
        if image.is_empty() {
            return None;
        }
        if image.starts_with("http") || image.starts_with("data:") {
            return Some(image.to_string());
        }

        let base = self.api.base_url();
        let host = base.strip_suffix("/api").unwrap_or(base);
        Some(format!("{host}/storage/{}", image.trim_start_matches('/')))
    }
}

async fn image_part(path: &std::path::Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::InvalidInput(format!("Failed to read image {}: {e}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(FALLBACK_IMAGE_NAME)
        .to_string();
    let mime = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_IMAGE_MIME);

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|e| Error::InvalidInput(format!("Unsupported image type: {e}")))
}
