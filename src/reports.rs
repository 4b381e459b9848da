use crate::aggregate::{aggregate_by, group_by_dimensions, year_trend, Dimension, TrendDirection, YearTrend};
use crate::anomaly::{detect_anomalies, AnomalyConfig, AnomalyFlag};
use crate::types::{
    AnomalyRow, CategoryYearRow, ConsumptionRecord, PropertyStatus, RankingRow, SummaryStats,
    VacantTrendRow, YearTotalRow,
};
use crate::util::format_number;
use std::collections::{BTreeMap, HashSet};

/// Everything the analysis step produces, kept together so the CLI can
/// write and preview it in one pass.
#[derive(Debug)]
pub struct ReportSet {
    pub total_by_year: Vec<YearTotalRow>,
    pub business_by_year: Vec<CategoryYearRow>,
    pub zone_by_year: Vec<CategoryYearRow>,
    pub status_by_year: Vec<CategoryYearRow>,
    pub top_business_types: Vec<RankingRow>,
    pub vacant_trend_rows: Vec<VacantTrendRow>,
    pub vacant_trend: YearTrend,
    pub anomaly_flags: Vec<AnomalyFlag>,
    pub anomalies: Vec<AnomalyRow>,
    pub zone_ranking: Vec<RankingRow>,
    pub summary: SummaryStats,
}

pub fn build_reports(data: &[ConsumptionRecord], anomaly: &AnomalyConfig, top_n: usize) -> ReportSet {
    let latest = latest_year(data);
    let total_by_year = generate_total_by_year(data);
    let business_by_year = generate_category_by_year(data, Dimension::BusinessType);
    let zone_by_year = generate_category_by_year(data, Dimension::ResourceZone);
    let status_by_year = generate_category_by_year(data, Dimension::PropertyStatus);
    let top_business_types = latest
        .map(|y| generate_top_business_types(data, y, top_n))
        .unwrap_or_default();
    let (vacant_trend_rows, vacant_trend) = generate_vacant_trend(data);
    let anomaly_flags = detect_anomalies(data, anomaly);
    let anomalies = generate_anomaly_rows(&anomaly_flags);
    let zone_ranking = generate_zone_ranking(data);
    let summary = generate_summary(
        data,
        &top_business_types,
        &vacant_trend,
        &anomaly_flags,
        &zone_ranking,
        anomaly.threshold,
    );
    ReportSet {
        total_by_year,
        business_by_year,
        zone_by_year,
        status_by_year,
        top_business_types,
        vacant_trend_rows,
        vacant_trend,
        anomaly_flags,
        anomalies,
        zone_ranking,
        summary,
    }
}

pub fn latest_year(data: &[ConsumptionRecord]) -> Option<i32> {
    data.iter().map(|r| r.year).max()
}

fn share_pct(part: f64, whole: f64) -> f64 {
    if whole.abs() < f64::EPSILON {
        0.0
    } else {
        part / whole * 100.0
    }
}

pub fn generate_total_by_year(data: &[ConsumptionRecord]) -> Vec<YearTotalRow> {
    let mut map: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for r in data {
        let e = map.entry(r.year).or_insert((0.0, 0));
        e.0 += r.consumption_volume;
        e.1 += 1;
    }
    map.into_iter()
        .map(|(year, (total, records))| YearTotalRow {
            year,
            total: format_number(total, 2),
            records,
        })
        .collect()
}

/// Yearly totals per value of `dim`, ordered by category then year.
pub fn generate_category_by_year(data: &[ConsumptionRecord], dim: Dimension) -> Vec<CategoryYearRow> {
    let agg = aggregate_by(data, |r| (dim.value(r), r.year));
    agg.iter()
        .map(|((category, year), total)| CategoryYearRow {
            category: category.clone(),
            year: *year,
            total: format_number(total, 2),
        })
        .collect()
}

/// Question 1: which business types used the most water in `year`.
pub fn generate_top_business_types(data: &[ConsumptionRecord], year: i32, n: usize) -> Vec<RankingRow> {
    let in_year: Vec<ConsumptionRecord> = data.iter().filter(|r| r.year == year).cloned().collect();
    let agg = aggregate_by(&in_year, |r| r.business_type.clone());
    let whole = agg.grand_total();
    agg.top_n(n)
        .into_iter()
        .enumerate()
        .map(|(idx, (name, total))| RankingRow {
            rank: idx + 1,
            name,
            total: format_number(total, 2),
            share_pct: format_number(share_pct(total, whole), 2),
        })
        .collect()
}

/// Question 2: vacant consumption per year, its share of each year's
/// total, and the fitted direction.
pub fn generate_vacant_trend(data: &[ConsumptionRecord]) -> (Vec<VacantTrendRow>, YearTrend) {
    let trend = year_trend(data, |r| r.property_status == PropertyStatus::Vacant);
    let totals = group_by_dimensions(data, &[Dimension::Year]);
    let deltas: BTreeMap<i32, f64> = trend.deltas().into_iter().collect();

    let rows = trend
        .points
        .iter()
        .map(|(year, vacant)| {
            let year_total = totals.get(&vec![year.to_string()]).unwrap_or(0.0);
            VacantTrendRow {
                year: *year,
                vacant_total: format_number(*vacant, 2),
                year_total: format_number(year_total, 2),
                vacant_share_pct: format_number(share_pct(*vacant, year_total), 2),
                yoy_change: deltas
                    .get(year)
                    .map(|d| format_number(*d, 2))
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();
    (rows, trend)
}

/// Question 3 as a table.
pub fn generate_anomaly_rows(flags: &[AnomalyFlag]) -> Vec<AnomalyRow> {
    flags
        .iter()
        .map(|f| AnomalyRow {
            business_type: f.business_type.clone(),
            target_total: format_number(f.target_total, 2),
            baseline_mean: format_number(f.baseline_mean, 2),
            ratio: format!("{:.2}", f.ratio),
            pct_change: format!("{:.1}", f.pct_change),
            flag: if f.is_anomalous {
                "ANOMALY".to_string()
            } else {
                "OK".to_string()
            },
        })
        .collect()
}

/// Question 4: resource zones ranked by total usage over every year.
pub fn generate_zone_ranking(data: &[ConsumptionRecord]) -> Vec<RankingRow> {
    let agg = aggregate_by(data, |r| r.resource_zone.clone());
    let whole = agg.grand_total();
    agg.top_n(agg.len())
        .into_iter()
        .enumerate()
        .map(|(idx, (name, total))| RankingRow {
            rank: idx + 1,
            name,
            total: format_number(total, 2),
            share_pct: format_number(share_pct(total, whole), 2),
        })
        .collect()
}

fn describe_trend(trend: &YearTrend) -> String {
    match (trend.points.len(), trend.direction, trend.monotonic) {
        (0, _, _) => "no vacant data".to_string(),
        (1, _, _) => "single year of vacant data".to_string(),
        (_, TrendDirection::Flat, _) => "flat".to_string(),
        (_, dir, true) => format!("{dir} (every year)"),
        (_, dir, false) => dir.to_string(),
    }
}

/// One-line description of the vacant trend with its fitted slope, used as
/// the note under the vacant-trend preview.
pub fn vacant_trend_note(reports: &ReportSet) -> String {
    let trend = &reports.vacant_trend;
    if trend.points.len() < 2 {
        return format!("Trend: {}", reports.summary.vacant_trend);
    }
    format!(
        "Trend: {} ({} per year)",
        reports.summary.vacant_trend,
        format_number(trend.slope, 2)
    )
}

pub fn generate_summary(
    data: &[ConsumptionRecord],
    top_business_types: &[RankingRow],
    vacant_trend: &YearTrend,
    flags: &[AnomalyFlag],
    zones: &[RankingRow],
    threshold: f64,
) -> SummaryStats {
    let types: HashSet<&str> = data.iter().map(|r| r.business_type.as_str()).collect();
    let zone_names: HashSet<&str> = data.iter().map(|r| r.resource_zone.as_str()).collect();
    let latest = latest_year(data);
    let latest_year_total = latest
        .map(|y| {
            data.iter()
                .filter(|r| r.year == y)
                .map(|r| r.consumption_volume)
                .sum()
        })
        .unwrap_or(0.0);
    SummaryStats {
        generated_at: chrono::Utc::now(),
        total_records: data.len(),
        total_business_types: types.len(),
        total_resource_zones: zone_names.len(),
        first_year: data.iter().map(|r| r.year).min(),
        latest_year: latest,
        total_consumption: data.iter().map(|r| r.consumption_volume).sum(),
        latest_year_total,
        top_business_type_latest_year: top_business_types.first().map(|r| r.name.clone()),
        vacant_trend: describe_trend(vacant_trend),
        anomaly_threshold: threshold,
        anomalous_business_types: flags
            .iter()
            .filter(|f| f.is_anomalous)
            .map(|f| f.business_type.clone())
            .collect(),
        top_resource_zone: zones.first().map(|r| r.name.clone()),
    }
}

/// Markdown digest of the four answers, written to `insights.md`.
pub fn render_insights(reports: &ReportSet, target_year: i32, max_items: usize) -> String {
    let s = &reports.summary;
    let mut out = Vec::new();
    match (s.first_year, s.latest_year) {
        (Some(first), Some(latest)) => {
            out.push(format!("# Water Consumption Summary ({first}–{latest})"));
            out.push(String::new());
            out.push(format!(
                "**Total in {latest}:** {}",
                format_number(s.latest_year_total, 0)
            ));
        }
        _ => out.push("# Water Consumption Summary".to_string()),
    }

    out.push(String::new());
    out.push("## Top Business Types".to_string());
    for r in reports.top_business_types.iter().take(max_items) {
        out.push(format!("- {}: {} ({}%)", r.name, r.total, r.share_pct));
    }

    out.push(String::new());
    out.push("## Vacant Property Trend".to_string());
    if reports.vacant_trend.points.len() >= 2 {
        out.push(format!(
            "Vacant consumption is {}, about {} per year.",
            s.vacant_trend,
            format_number(reports.vacant_trend.slope, 0)
        ));
    } else {
        out.push(format!("Vacant consumption: {}.", s.vacant_trend));
    }
    for r in &reports.vacant_trend_rows {
        out.push(format!(
            "- {}: {} ({}% of total)",
            r.year, r.vacant_total, r.vacant_share_pct
        ));
    }

    out.push(String::new());
    out.push(format!("## {target_year} Anomalies"));
    if reports.anomaly_flags.is_empty() {
        out.push("No business type has both target-year and baseline data.".to_string());
    }
    for f in reports.anomaly_flags.iter().take(max_items) {
        let marker = if f.is_anomalous { " **anomalous**" } else { "" };
        out.push(format!(
            "- {}: {:.1}% change{}",
            f.business_type, f.pct_change, marker
        ));
    }

    out.push(String::new());
    out.push("## Resource Zones".to_string());
    if let Some(top) = &s.top_resource_zone {
        out.push(format!("Highest total usage: **{top}**"));
    }
    for r in reports.zone_ranking.iter().take(max_items) {
        out.push(format!("- {}: {}", r.name, r.total));
    }
    out.push(String::new());
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ty: &str, zone: &str, status: PropertyStatus, year: i32, vol: f64) -> ConsumptionRecord {
        ConsumptionRecord {
            business_id: format!("{ty}-{year}"),
            business_type: ty.to_string(),
            property_status: status,
            resource_zone: zone.to_string(),
            year,
            consumption_volume: vol,
        }
    }

    fn dataset() -> Vec<ConsumptionRecord> {
        use PropertyStatus::*;
        vec![
            rec("Manufacturing", "North", Occupied, 2020, 180.0),
            rec("Manufacturing", "North", Occupied, 2021, 200.0),
            rec("Manufacturing", "North", Occupied, 2022, 500.0),
            rec("Manufacturing", "North", Occupied, 2023, 190.0),
            rec("Retail", "South", Vacant, 2020, 300.0),
            rec("Retail", "South", Vacant, 2021, 280.0),
            rec("Retail", "South", Vacant, 2022, 260.0),
            rec("Retail", "South", Vacant, 2023, 240.0),
            rec("Office", "East", Occupied, 2023, 240.0),
        ]
    }

    #[test]
    fn answers_the_four_questions() {
        let reports = build_reports(&dataset(), &AnomalyConfig::default(), 5);
        let s = &reports.summary;

        // Retail and Office tie at 240 in 2023; the tie goes to "Office".
        let names: Vec<&str> = reports
            .top_business_types
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Office", "Retail", "Manufacturing"]);
        assert_eq!(s.top_business_type_latest_year.as_deref(), Some("Office"));

        assert_eq!(reports.vacant_trend.direction, TrendDirection::Decreasing);
        assert_eq!(s.vacant_trend, "decreasing (every year)");

        assert_eq!(s.anomalous_business_types, vec!["Manufacturing"]);

        assert_eq!(s.top_resource_zone.as_deref(), Some("South"));
        assert_eq!(reports.zone_ranking.len(), 3);
        assert_eq!(s.latest_year, Some(2023));
        assert_eq!(s.latest_year_total, 670.0);
    }

    #[test]
    fn vacant_share_uses_year_totals() {
        let (rows, _) = generate_vacant_trend(&dataset());
        assert_eq!(rows.len(), 4);
        // 2020: vacant 300 of 480.
        assert_eq!(rows[0].vacant_share_pct, "62.50");
        assert_eq!(rows[0].yoy_change, "-");
        assert_eq!(rows[1].yoy_change, "-20.00");
    }

    #[test]
    fn vacant_note_reports_fitted_slope() {
        let reports = build_reports(&dataset(), &AnomalyConfig::default(), 5);
        assert_eq!(
            vacant_trend_note(&reports),
            "Trend: decreasing (every year) (-20.00 per year)"
        );
        let md = render_insights(&reports, 2022, 5);
        assert!(md.contains("Vacant consumption is decreasing (every year), about -20 per year."));

        let empty = build_reports(&[], &AnomalyConfig::default(), 5);
        assert_eq!(vacant_trend_note(&empty), "Trend: no vacant data");
    }

    #[test]
    fn category_rows_cover_every_pair() {
        let rows = generate_category_by_year(&dataset(), Dimension::BusinessType);
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0].category, "Manufacturing");
        assert_eq!(rows[0].year, 2020);
        assert_eq!(rows[0].total, "180.00");
        let by_year = generate_total_by_year(&dataset());
        assert_eq!(by_year.len(), 4);
        assert_eq!(by_year[3].records, 3);
    }

    #[test]
    fn insights_mention_each_section() {
        let reports = build_reports(&dataset(), &AnomalyConfig::default(), 5);
        let md = render_insights(&reports, 2022, 5);
        assert!(md.starts_with("# Water Consumption Summary (2020–2023)"));
        assert!(md.contains("**Total in 2023:** 670"));
        assert!(md.contains("## Top Business Types"));
        assert!(md.contains("- Manufacturing: 163.2% change **anomalous**"));
        assert!(md.contains("Highest total usage: **South**"));
    }

    #[test]
    fn empty_dataset_produces_empty_reports() {
        let reports = build_reports(&[], &AnomalyConfig::default(), 5);
        assert!(reports.top_business_types.is_empty());
        assert!(reports.zone_ranking.is_empty());
        assert_eq!(reports.summary.vacant_trend, "no vacant data");
        let md = render_insights(&reports, 2022, 5);
        assert!(md.starts_with("# Water Consumption Summary\n"));
    }
}
