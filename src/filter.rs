// Record selection for dashboard-style views.
//
// A dashboard narrows the cleaned records by year range, business type,
// resource zone and property status, then asks the aggregator and anomaly
// detector about what is left. Empty selections mean "everything".
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use serde::Serialize;

use crate::types::{ConsumptionRecord, PropertyStatus};

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub years: Option<RangeInclusive<i32>>,
    pub business_types: BTreeSet<String>,
    pub resource_zones: BTreeSet<String>,
    pub statuses: BTreeSet<PropertyStatus>,
}

impl RecordFilter {
    pub fn with_years(mut self, years: RangeInclusive<i32>) -> Self {
        self.years = Some(years);
        self
    }

    pub fn with_business_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.business_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_resource_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_zones.extend(zones.into_iter().map(Into::into));
        self
    }

    pub fn with_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = PropertyStatus>,
    {
        self.statuses.extend(statuses);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_none()
            && self.business_types.is_empty()
            && self.resource_zones.is_empty()
            && self.statuses.is_empty()
    }

    pub fn matches(&self, r: &ConsumptionRecord) -> bool {
        self.years.as_ref().map_or(true, |ys| ys.contains(&r.year))
            && (self.business_types.is_empty() || self.business_types.contains(&r.business_type))
            && (self.resource_zones.is_empty() || self.resource_zones.contains(&r.resource_zone))
            && (self.statuses.is_empty() || self.statuses.contains(&r.property_status))
    }

    pub fn apply(&self, records: &[ConsumptionRecord]) -> Vec<ConsumptionRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Parse `2020-2022` or a single `2021` into an inclusive range.
pub fn parse_year_range(s: &str) -> Result<RangeInclusive<i32>, String> {
    let s = s.trim();
    let (start, end) = match s.split_once(['-', ':']) {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (s, s),
    };
    let start: i32 = start
        .parse()
        .map_err(|_| format!("invalid start year in '{s}'"))?;
    let end: i32 = end.parse().map_err(|_| format!("invalid end year in '{s}'"))?;
    if start > end {
        return Err(format!("year range '{s}' is reversed"));
    }
    Ok(start..=end)
}

/// Headline figures for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total: f64,
    pub target_year: i32,
    pub target_year_total: f64,
    pub vacant_total: f64,
    pub rows: usize,
}

impl Kpis {
    pub fn compute(records: &[ConsumptionRecord], target_year: i32) -> Self {
        let mut k = Kpis {
            total: 0.0,
            target_year,
            target_year_total: 0.0,
            vacant_total: 0.0,
            rows: records.len(),
        };
        for r in records {
            k.total += r.consumption_volume;
            if r.year == target_year {
                k.target_year_total += r.consumption_volume;
            }
            if r.property_status == PropertyStatus::Vacant {
                k.vacant_total += r.consumption_volume;
            }
        }
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ty: &str, zone: &str, status: PropertyStatus, year: i32, vol: f64) -> ConsumptionRecord {
        ConsumptionRecord {
            business_id: "x".to_string(),
            business_type: ty.to_string(),
            property_status: status,
            resource_zone: zone.to_string(),
            year,
            consumption_volume: vol,
        }
    }

    fn sample() -> Vec<ConsumptionRecord> {
        vec![
            rec("Retail", "North", PropertyStatus::Vacant, 2020, 1.0),
            rec("Retail", "South", PropertyStatus::Occupied, 2022, 2.0),
            rec("Office", "North", PropertyStatus::Occupied, 2022, 4.0),
            rec("Office", "South", PropertyStatus::Vacant, 2023, 8.0),
        ]
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let f = RecordFilter::default();
        assert!(f.is_empty());
        assert_eq!(f.apply(&sample()).len(), 4);
    }

    #[test]
    fn filters_combine_with_and() {
        let f = RecordFilter::default()
            .with_years(2021..=2023)
            .with_business_types(["Office"])
            .with_resource_zones(["North", "South"]);
        let out = f.apply(&sample());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.business_type == "Office"));

        let vacant = RecordFilter::default().with_statuses([PropertyStatus::Vacant]);
        assert_eq!(vacant.apply(&sample()).len(), 2);
    }

    #[test]
    fn parses_year_ranges() {
        assert_eq!(parse_year_range("2020-2022"), Ok(2020..=2022));
        assert_eq!(parse_year_range(" 2021 "), Ok(2021..=2021));
        assert!(parse_year_range("2023-2020").is_err());
        assert!(parse_year_range("last year").is_err());
    }

    #[test]
    fn kpis_for_selection() {
        let k = Kpis::compute(&sample(), 2022);
        assert_eq!(k.total, 15.0);
        assert_eq!(k.target_year_total, 6.0);
        assert_eq!(k.vacant_total, 9.0);
        assert_eq!(k.rows, 4);
    }
}
