// Grouped sums and means over cleaned records.
//
// Grouping is driven by an explicit key selector so callers can group on
// any combination of fields without string column lookups:
//
//     let by_type_year = aggregate_by(&records, |r| (r.business_type.clone(), r.year));
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::ConsumptionRecord;
use crate::util::{average, linear_slope};

/// Summed (or averaged) consumption per distinct key.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<K: Ord> {
    groups: BTreeMap<K, f64>,
    total: f64,
}

impl<K: Ord> Default for AggregateResult<K> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            total: 0.0,
        }
    }
}

impl<K: Ord + Clone> AggregateResult<K> {
    pub fn get(&self, key: &K) -> Option<f64> {
        self.groups.get(key).copied()
    }

    /// Sum of every contributing volume, independent of how it was grouped.
    pub fn grand_total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Groups in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.groups.iter().map(|(k, v)| (k, *v))
    }

    /// Largest `n` groups, value descending; equal values fall back to
    /// ascending key order.
    pub fn top_n(&self, n: usize) -> Vec<(K, f64)> {
        let mut ranked: Vec<(K, f64)> = self.groups.iter().map(|(k, v)| (k.clone(), *v)).collect();
        // The map is already in key order and the sort is stable, so ties
        // keep it.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(n);
        ranked
    }
}

/// Sum `consumption_volume` per key.
pub fn aggregate_by<K, F>(records: &[ConsumptionRecord], key_fn: F) -> AggregateResult<K>
where
    K: Ord,
    F: Fn(&ConsumptionRecord) -> K,
{
    let mut out = AggregateResult::default();
    for r in records {
        *out.groups.entry(key_fn(r)).or_insert(0.0) += r.consumption_volume;
        out.total += r.consumption_volume;
    }
    out
}

/// Mean `consumption_volume` per key. `grand_total` is still the plain sum.
pub fn average_by<K, F>(records: &[ConsumptionRecord], key_fn: F) -> AggregateResult<K>
where
    K: Ord,
    F: Fn(&ConsumptionRecord) -> K,
{
    let mut acc: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    let mut total = 0.0;
    for r in records {
        let e = acc.entry(key_fn(r)).or_insert((0.0, 0));
        e.0 += r.consumption_volume;
        e.1 += 1;
        total += r.consumption_volume;
    }
    AggregateResult {
        groups: acc
            .into_iter()
            .map(|(k, (sum, n))| (k, sum / n as f64))
            .collect(),
        total,
    }
}

/// A field records can be grouped on, selectable by name from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    BusinessType,
    PropertyStatus,
    ResourceZone,
    Year,
}

impl Dimension {
    pub fn value(self, r: &ConsumptionRecord) -> String {
        match self {
            Dimension::BusinessType => r.business_type.clone(),
            Dimension::PropertyStatus => r.property_status.to_string(),
            Dimension::ResourceZone => r.resource_zone.clone(),
            Dimension::Year => r.year.to_string(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::BusinessType => "business_type",
            Dimension::PropertyStatus => "property_status",
            Dimension::ResourceZone => "resource_zone",
            Dimension::Year => "year",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "business_type" | "type" | "business" => Ok(Dimension::BusinessType),
            "property_status" | "status" | "occupancy" => Ok(Dimension::PropertyStatus),
            "resource_zone" | "zone" => Ok(Dimension::ResourceZone),
            "year" => Ok(Dimension::Year),
            other => Err(format!(
                "unknown dimension '{other}' (expected business_type, property_status, resource_zone or year)"
            )),
        }
    }
}

/// Sum per combination of the given dimensions, keyed by their text values
/// in the order given.
pub fn group_by_dimensions(
    records: &[ConsumptionRecord],
    dims: &[Dimension],
) -> AggregateResult<Vec<String>> {
    aggregate_by(records, |r| dims.iter().map(|d| d.value(r)).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Flat => "flat",
        };
        f.write_str(s)
    }
}

/// Relative slope (per year, against the mean) below which a series counts
/// as flat.
const FLAT_TOLERANCE: f64 = 0.01;

/// Yearly totals of a subset of records, with a fitted direction.
#[derive(Debug, Clone)]
pub struct YearTrend {
    pub points: Vec<(i32, f64)>,
    pub slope: f64,
    pub direction: TrendDirection,
    /// Every year-on-year step moves the same way as `direction`.
    pub monotonic: bool,
}

impl YearTrend {
    /// `(year, change from previous year)` for every year after the first.
    pub fn deltas(&self) -> Vec<(i32, f64)> {
        self.points
            .windows(2)
            .map(|w| (w[1].0, w[1].1 - w[0].1))
            .collect()
    }
}

/// Total per year of the records matching `pred`, plus a least-squares
/// trend.
pub fn year_trend<P>(records: &[ConsumptionRecord], pred: P) -> YearTrend
where
    P: Fn(&ConsumptionRecord) -> bool,
{
    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for r in records.iter().filter(|r| pred(r)) {
        *by_year.entry(r.year).or_insert(0.0) += r.consumption_volume;
    }
    let points: Vec<(i32, f64)> = by_year.into_iter().collect();

    let xy: Vec<(f64, f64)> = points.iter().map(|(y, v)| (*y as f64, *v)).collect();
    let slope = linear_slope(&xy);
    let values: Vec<f64> = points.iter().map(|p| p.1).collect();
    let mean = average(&values);
    let relative = if mean.abs() < f64::EPSILON {
        0.0
    } else {
        slope / mean.abs()
    };
    let direction = if relative > FLAT_TOLERANCE {
        TrendDirection::Increasing
    } else if relative < -FLAT_TOLERANCE {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Flat
    };

    let steps = points.windows(2).map(|w| w[1].1 - w[0].1);
    let monotonic = points.len() >= 2
        && match direction {
            TrendDirection::Increasing => steps.into_iter().all(|d| d > 0.0),
            TrendDirection::Decreasing => steps.into_iter().all(|d| d < 0.0),
            TrendDirection::Flat => false,
        };

    YearTrend {
        points,
        slope,
        direction,
        monotonic,
    }
}
