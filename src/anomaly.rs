// Target-year anomaly detection per business type.
//
// A business type is compared against its own history: the target year's
// total over the mean of its yearly totals in the baseline years, where a
// baseline year without rows for the type counts as zero. Types with no
// target-year data or a zero baseline are left out instead of flagged.
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::aggregate::aggregate_by;
use crate::types::ConsumptionRecord;
use crate::util::average;

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    pub target_year: i32,
    /// 0.2 flags totals more than 20% above baseline.
    pub threshold: f64,
    /// `None` uses every non-target year in the dataset.
    pub baseline_years: Option<Vec<i32>>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            target_year: 2022,
            threshold: 0.2,
            baseline_years: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFlag {
    pub business_type: String,
    pub target_total: f64,
    pub baseline_mean: f64,
    pub baseline_years: Vec<i32>,
    /// `target_total / baseline_mean`.
    pub ratio: f64,
    /// Percentage change from baseline, `(ratio - 1) * 100`.
    pub pct_change: f64,
    pub is_anomalous: bool,
}

/// Compare each business type's target-year total against its baseline.
///
/// Results are ordered by ratio, highest first, ties by business type.
pub fn detect_anomalies(records: &[ConsumptionRecord], cfg: &AnomalyConfig) -> Vec<AnomalyFlag> {
    let totals = aggregate_by(records, |r| (r.business_type.clone(), r.year));

    let mut per_type: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    for ((ty, year), total) in totals.iter() {
        per_type.entry(ty.as_str()).or_default().insert(*year, total);
    }
    let comparison = comparison_years(records, cfg);
    if comparison.is_empty() {
        debug!("no comparison years, nothing to flag");
        return Vec::new();
    }

    let mut flags: Vec<AnomalyFlag> = Vec::new();
    for (ty, years) in per_type {
        let Some(&target_total) = years.get(&cfg.target_year) else {
            debug!(business_type = ty, "no target-year data, skipped");
            continue;
        };
        // A comparison year with no rows for this type counts as zero usage.
        let baseline: Vec<f64> = comparison
            .iter()
            .map(|y| years.get(y).copied().unwrap_or(0.0))
            .collect();
        let baseline_mean = average(&baseline);
        if baseline_mean <= 0.0 {
            // Ratio against a zero baseline is undefined.
            debug!(business_type = ty, "zero baseline, skipped");
            continue;
        }

        let ratio = target_total / baseline_mean;
        flags.push(AnomalyFlag {
            business_type: ty.to_string(),
            target_total,
            baseline_mean,
            baseline_years: comparison.clone(),
            ratio,
            pct_change: (ratio - 1.0) * 100.0,
            is_anomalous: target_total > baseline_mean * (1.0 + cfg.threshold),
        });
    }

    // `per_type` iterated in name order and the sort is stable.
    flags.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap_or(Ordering::Equal));
    flags
}

/// Years the baseline is averaged over: the configured list, or every
/// non-target year present in the dataset.
fn comparison_years(records: &[ConsumptionRecord], cfg: &AnomalyConfig) -> Vec<i32> {
    let years: BTreeSet<i32> = match &cfg.baseline_years {
        Some(ys) => ys.iter().copied().collect(),
        None => records.iter().map(|r| r.year).collect(),
    };
    years.into_iter().filter(|y| *y != cfg.target_year).collect()
}
