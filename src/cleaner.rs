use crate::config::CleaningConfig;
use crate::error::ValidationError;
use crate::schema::Layout;
use crate::types::{ConsumptionRecord, PropertyStatus, RawTable};
use crate::util::{collapse_whitespace, parse_f64_safe, parse_year_safe};
use serde::Serialize;
use tracing::{debug, info};

/// Label used when a business type or resource zone cell is blank.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Data-quality counters for one cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Data rows in the source file, readable or not.
    pub total_rows: usize,
    /// Rows the reader could not decode.
    pub unreadable_rows: usize,
    /// Candidate (row, year) observations after reshaping wide sheets.
    pub melted_rows: usize,
    pub kept: usize,
    /// Volume missing, not a number, or not finite.
    pub cast_errors: usize,
    pub negative_volume: usize,
    /// Year missing, not a number, or outside the supported range.
    pub invalid_year: usize,
    /// Blank business type / resource zone replaced with `Unknown`.
    pub defaulted_labels: usize,
    pub unknown_status: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.unreadable_rows + self.cast_errors + self.negative_volume + self.invalid_year
    }
}

/// Attributes shared by every observation taken from one source row.
struct RowLabels {
    business_id: String,
    business_type: String,
    property_status: PropertyStatus,
    resource_zone: String,
}

/// Turn raw rows into `ConsumptionRecord`s.
///
/// Bad rows are dropped and counted; the pass only fails when nothing at
/// all survives.
pub fn clean(
    table: &RawTable,
    cfg: &CleaningConfig,
) -> Result<(Vec<ConsumptionRecord>, CleanReport), ValidationError> {
    let cols = &table.columns;
    let years = cfg.min_year..=cfg.max_year;
    let mut report = CleanReport {
        total_rows: table.rows.len() + table.unreadable_rows,
        unreadable_rows: table.unreadable_rows,
        ..CleanReport::default()
    };
    let mut out: Vec<ConsumptionRecord> = Vec::new();
    debug!(headers = ?table.headers, layout = ?cols.layout, "cleaning");

    for (idx, row) in table.rows.iter().enumerate() {
        let labels = row_labels(table, row, idx, &mut report);

        // Each row yields (year cell, volume cell) pairs: one for long
        // sheets, one per year column for wide ones.
        let observations: Vec<(Option<i32>, Option<&str>)> = match cols.layout {
            Layout::Long => {
                let year = cols
                    .year
                    .and_then(|i| parse_year_safe(RawTable::cell(row, i)));
                let volume = cols.volume.and_then(|i| RawTable::cell(row, i));
                vec![(year, volume)]
            }
            Layout::Wide => cols
                .year_columns
                .iter()
                .map(|&(i, y)| (Some(y), RawTable::cell(row, i)))
                .collect(),
        };

        for (year, volume) in observations {
            report.melted_rows += 1;

            let year = match year {
                Some(y) if years.contains(&y) => y,
                _ => {
                    report.invalid_year += 1;
                    continue;
                }
            };
            let consumption_volume = match parse_f64_safe(volume).filter(|v| v.is_finite()) {
                Some(v) if v >= 0.0 => v,
                Some(_) => {
                    report.negative_volume += 1;
                    continue;
                }
                None => {
                    report.cast_errors += 1;
                    continue;
                }
            };

            out.push(ConsumptionRecord {
                business_id: labels.business_id.clone(),
                business_type: labels.business_type.clone(),
                property_status: labels.property_status,
                resource_zone: labels.resource_zone.clone(),
                year,
                consumption_volume,
            });
        }
    }

    report.kept = out.len();
    debug!(?report, "cleaning counters");
    if out.is_empty() {
        return Err(ValidationError::NoUsableRows {
            total_rows: report.total_rows,
        });
    }
    info!(
        kept = report.kept,
        dropped = report.dropped(),
        "cleaned {}",
        table.source.display()
    );
    Ok((out, report))
}

fn row_labels(table: &RawTable, row: &[String], idx: usize, report: &mut CleanReport) -> RowLabels {
    let cols = &table.columns;
    let mut label = |i: usize| -> String {
        match RawTable::cell(row, i) {
            Some(s) => collapse_whitespace(s),
            None => {
                report.defaulted_labels += 1;
                UNKNOWN_LABEL.to_string()
            }
        }
    };
    let business_type = label(cols.business_type);
    let resource_zone = label(cols.resource_zone);

    let property_status = cols
        .property_status
        .and_then(|i| RawTable::cell(row, i))
        .map(PropertyStatus::normalize)
        .unwrap_or(PropertyStatus::Unknown);
    if property_status == PropertyStatus::Unknown {
        report.unknown_status += 1;
    }

    // Source rows are numbered from 1, after the header.
    let business_id = cols
        .business_id
        .and_then(|i| RawTable::cell(row, i))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| format!("row-{}", idx + 1));

    RowLabels {
        business_id,
        business_type,
        property_status,
        resource_zone,
    }
}
