// Column name canonicalisation.
//
// Source sheets name their columns inconsistently ("Type of Business",
// "business_type", "Account Type"...). The loader uses `ColumnMap::resolve`
// to reject files that lack required columns; the cleaner uses the same map
// to find each field in a row.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LoadError;

/// The fields a `ConsumptionRecord` is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    BusinessId,
    BusinessType,
    PropertyStatus,
    ResourceZone,
    Year,
    ConsumptionVolume,
}

impl Column {
    pub fn canonical_name(self) -> &'static str {
        match self {
            Column::BusinessId => "business_id",
            Column::BusinessType => "business_type",
            Column::PropertyStatus => "property_status",
            Column::ResourceZone => "resource_zone",
            Column::Year => "year",
            Column::ConsumptionVolume => "consumption_volume",
        }
    }

    /// Accepted header spellings, already in normalised form.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::BusinessId => &["business id", "spid", "id", "site id", "property id"],
            Column::BusinessType => &[
                "business type",
                "type of business",
                "account type",
                "industry",
            ],
            Column::PropertyStatus => &[
                "property status",
                "occupancy status",
                "occupied/vacant",
                "status",
                "occupancy",
            ],
            Column::ResourceZone => &["resource zone", "zone", "rz"],
            Column::Year => &["year"],
            Column::ConsumptionVolume => &["consumption volume", "consumption", "volume", "usage"],
        }
    }

    const ALL: [Column; 6] = [
        Column::BusinessId,
        Column::BusinessType,
        Column::PropertyStatus,
        Column::ResourceZone,
        Column::Year,
        Column::ConsumptionVolume,
    ];
}

static YEAR_IN_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})").expect("year header pattern is valid"));

/// Lowercase, trim, treat `_`/`-` as spaces and collapse whitespace.
pub fn normalize_header(h: &str) -> String {
    h.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One row per (property, year) with explicit year and volume columns.
    Long,
    /// One row per property with a volume column per year.
    Wide,
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub business_id: Option<usize>,
    pub business_type: usize,
    pub property_status: Option<usize>,
    pub resource_zone: usize,
    pub layout: Layout,
    /// `(index, year)` pairs; only populated for `Layout::Wide`.
    pub year_columns: Vec<(usize, i32)>,
    pub year: Option<usize>,
    pub volume: Option<usize>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String]) -> Result<Self, LoadError> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

        let mut found: [Option<usize>; 6] = [None; 6];
        for (slot, col) in found.iter_mut().zip(Column::ALL) {
            // First alias that matches any header wins, so the alias order
            // doubles as a preference order.
            *slot = col
                .aliases()
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias));
        }
        let [business_id, business_type, property_status, resource_zone, year, volume] = found;

        let claimed: Vec<usize> = found.iter().flatten().copied().collect();
        let year_columns: Vec<(usize, i32)> = normalized
            .iter()
            .enumerate()
            .filter(|(idx, _)| !claimed.contains(idx))
            .filter_map(|(idx, h)| {
                let caps = YEAR_IN_HEADER.captures(h)?;
                let y = caps.get(1)?.as_str().parse::<i32>().ok()?;
                Some((idx, y))
            })
            .collect();

        let layout = if year.is_some() && volume.is_some() {
            Layout::Long
        } else {
            Layout::Wide
        };

        let mut missing = Vec::new();
        if business_type.is_none() {
            missing.push(Column::BusinessType.canonical_name().to_string());
        }
        if resource_zone.is_none() {
            missing.push(Column::ResourceZone.canonical_name().to_string());
        }
        if layout == Layout::Wide && year_columns.is_empty() {
            if year.is_none() {
                missing.push(Column::Year.canonical_name().to_string());
            }
            if volume.is_none() {
                missing.push(Column::ConsumptionVolume.canonical_name().to_string());
            }
        }
        let (Some(business_type), Some(resource_zone), true) =
            (business_type, resource_zone, missing.is_empty())
        else {
            return Err(LoadError::MissingColumns(missing));
        };

        Ok(Self {
            business_id,
            business_type,
            property_status,
            resource_zone,
            layout,
            year_columns: if layout == Layout::Wide {
                year_columns
            } else {
                Vec::new()
            },
            year,
            volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_header_variants() {
        assert_eq!(normalize_header("  Resource_Zone "), "resource zone");
        assert_eq!(normalize_header("Type  of Business"), "type of business");
    }

    #[test]
    fn resolves_long_layout() {
        let map = ColumnMap::resolve(&headers(&[
            "Business ID",
            "Business Type",
            "Property Status",
            "Resource Zone",
            "Year",
            "Consumption Volume",
        ]))
        .unwrap();
        assert_eq!(map.layout, Layout::Long);
        assert_eq!(map.business_id, Some(0));
        assert_eq!(map.year, Some(4));
        assert_eq!(map.volume, Some(5));
        assert!(map.year_columns.is_empty());
    }

    #[test]
    fn resolves_wide_layout_with_aliases() {
        let map = ColumnMap::resolve(&headers(&[
            "SPID",
            "Type of Business",
            "Occupied/Vacant",
            "RZ",
            "Consumption 2020",
            "Consumption 2021",
            "2022",
        ]))
        .unwrap();
        assert_eq!(map.layout, Layout::Wide);
        assert_eq!(map.property_status, Some(2));
        assert_eq!(map.resource_zone, 3);
        assert_eq!(map.year_columns, vec![(4, 2020), (5, 2021), (6, 2022)]);
    }

    #[test]
    fn reports_missing_columns() {
        let err = ColumnMap::resolve(&headers(&["Business Type", "Notes"])).unwrap_err();
        match err {
            LoadError::MissingColumns(cols) => {
                assert_eq!(
                    cols,
                    vec!["resource_zone", "year", "consumption_volume"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
