// Command-line interface argument parsing.
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::aggregate::Dimension;
use crate::filter::{parse_year_range, RecordFilter};
use crate::types::PropertyStatus;

/// Water consumption analysis for business accounts.
///
/// Loads a spreadsheet of yearly consumption per property, cleans it and
/// answers four questions: top business types, vacant-property trend,
/// target-year anomalies by business type and top resource zone.
///
/// Examples:
///   water_report prepare --input data/raw/DRA_exercise.xlsx
///   water_report analyze --input data/processed/water_long.csv --threshold 0.25
///   water_report analyze --years 2021-2023 --zone "Zone A"
///   water_report group-by --by business_type,year --top 10
///   water_report            (interactive menu)
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for water_report.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE", env = "WATER_REPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load and clean the raw file, then write the processed long-format CSV
    Prepare(RunArgs),
    /// Compute the report tables, summary.json and insights.md
    Analyze(AnalyzeArgs),
    /// Sum (or average) consumption over any combination of dimensions
    GroupBy(GroupByArgs),
    /// Write a default config to --config (or water_report.toml)
    InitConfig,
}

/// Options shared by every data-processing subcommand. Unset flags fall
/// back to the config file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunArgs {
    /// Raw spreadsheet/CSV or a processed water_long.csv
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory for the processed CSV
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Directory for report files
    #[arg(long, value_name = "DIR")]
    pub reports_dir: Option<PathBuf>,

    /// Fraction above baseline that counts as anomalous (0.2 = 20%)
    #[arg(long, value_name = "RATIO")]
    pub threshold: Option<f64>,

    /// Year checked for anomalies
    #[arg(long, value_name = "YEAR")]
    pub target_year: Option<i32>,

    /// Number of rows in top-N rankings
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Restrict to a year or inclusive range, e.g. 2021 or 2020-2022
    #[arg(long, value_name = "RANGE", value_parser = parse_year_range)]
    pub years: Option<RangeInclusive<i32>>,

    /// Restrict to business types (repeatable or comma-separated)
    #[arg(long = "business-type", value_name = "TYPE", value_delimiter = ',')]
    pub business_types: Vec<String>,

    /// Restrict to resource zones (repeatable or comma-separated)
    #[arg(long = "zone", value_name = "ZONE", value_delimiter = ',')]
    pub zones: Vec<String>,

    /// Restrict to property statuses
    #[arg(long = "status", value_name = "STATUS", value_delimiter = ',')]
    pub statuses: Vec<StatusArg>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> RecordFilter {
        let mut f = RecordFilter::default()
            .with_business_types(self.business_types.iter().cloned())
            .with_resource_zones(self.zones.iter().cloned())
            .with_statuses(self.statuses.iter().map(|s| PropertyStatus::from(*s)));
        if let Some(ref ys) = self.years {
            f = f.with_years(ys.clone());
        }
        f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusArg {
    Occupied,
    Vacant,
    Unknown,
}

impl From<StatusArg> for PropertyStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Occupied => PropertyStatus::Occupied,
            StatusArg::Vacant => PropertyStatus::Vacant,
            StatusArg::Unknown => PropertyStatus::Unknown,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GroupByArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Dimensions to group on: business_type, property_status, resource_zone, year
    #[arg(long, value_name = "DIMS", value_delimiter = ',', required = true)]
    pub by: Vec<Dimension>,

    /// Average instead of sum
    #[arg(long)]
    pub mean: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default tracing directive for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "water_report=debug"
        } else if self.quiet {
            "water_report=warn"
        } else {
            "water_report=info"
        }
    }
}
