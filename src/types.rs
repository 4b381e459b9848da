use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tabled::Tabled;

use crate::schema::ColumnMap;

/// Cells of the first worksheet (or CSV file) as text, before any typing.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Records the reader could not decode (e.g. invalid UTF-8); not in `rows`.
    pub unreadable_rows: usize,
    pub columns: ColumnMap,
}

impl RawTable {
    /// Cell text at `idx`, or `None` for short rows and blank cells.
    pub fn cell(row: &[String], idx: usize) -> Option<&str> {
        row.get(idx).map(|s| s.as_str()).filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Occupied,
    Vacant,
    Unknown,
}

impl PropertyStatus {
    /// Map free-text occupancy values ("Vacant", "VACANT ", "Occupied") onto
    /// the enum. Anything unrecognised is `Unknown`.
    pub fn normalize(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match s.as_str() {
            "vacant" | "unoccupied" | "void" | "empty" | "v" => PropertyStatus::Vacant,
            "occupied" | "occ" | "o" | "in use" => PropertyStatus::Occupied,
            // "unoccupied" contains "occupied", so vacancy is checked first.
            _ if s.contains("vacant") || s.contains("unoccupied") => PropertyStatus::Vacant,
            _ if s.contains("occupied") => PropertyStatus::Occupied,
            _ => PropertyStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyStatus::Occupied => "occupied",
            PropertyStatus::Vacant => "vacant",
            PropertyStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cleaned (property, year) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub business_id: String,
    pub business_type: String,
    pub property_status: PropertyStatus,
    pub resource_zone: String,
    pub year: i32,
    pub consumption_volume: f64,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct YearTotalRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "TotalConsumption")]
    #[tabled(rename = "TotalConsumption")]
    pub total: String,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
}

/// A (category, year) total, shared by the business type, resource zone and
/// property status breakdowns.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CategoryYearRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "TotalConsumption")]
    #[tabled(rename = "TotalConsumption")]
    pub total: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RankingRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "TotalConsumption")]
    #[tabled(rename = "TotalConsumption")]
    pub total: String,
    #[serde(rename = "SharePct")]
    #[tabled(rename = "SharePct")]
    pub share_pct: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct VacantTrendRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "VacantConsumption")]
    #[tabled(rename = "VacantConsumption")]
    pub vacant_total: String,
    #[serde(rename = "YearTotal")]
    #[tabled(rename = "YearTotal")]
    pub year_total: String,
    #[serde(rename = "VacantSharePct")]
    #[tabled(rename = "VacantSharePct")]
    pub vacant_share_pct: String,
    #[serde(rename = "YoYChange")]
    #[tabled(rename = "YoYChange")]
    pub yoy_change: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct AnomalyRow {
    #[serde(rename = "BusinessType")]
    #[tabled(rename = "BusinessType")]
    pub business_type: String,
    #[serde(rename = "TargetYearTotal")]
    #[tabled(rename = "TargetYearTotal")]
    pub target_total: String,
    #[serde(rename = "BaselineMean")]
    #[tabled(rename = "BaselineMean")]
    pub baseline_mean: String,
    #[serde(rename = "Ratio")]
    #[tabled(rename = "Ratio")]
    pub ratio: String,
    #[serde(rename = "PctChange")]
    #[tabled(rename = "PctChange")]
    pub pct_change: String,
    #[serde(rename = "Flag")]
    #[tabled(rename = "Flag")]
    pub flag: String,
}

/// One line of an ad-hoc `group-by` result.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct GroupRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Consumption")]
    #[tabled(rename = "Consumption")]
    pub consumption: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub total_records: usize,
    pub total_business_types: usize,
    pub total_resource_zones: usize,
    pub first_year: Option<i32>,
    pub latest_year: Option<i32>,
    pub total_consumption: f64,
    pub latest_year_total: f64,
    pub top_business_type_latest_year: Option<String>,
    pub vacant_trend: String,
    pub anomaly_threshold: f64,
    pub anomalous_business_types: Vec<String>,
    pub top_resource_zone: Option<String>,
}
