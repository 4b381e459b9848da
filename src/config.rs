// Configuration file handling.
//
// Settings come from `water_report.toml` (or the file named by `--config` /
// `WATER_REPORT_CONFIG`). Every field has a default, so a missing file or a
// partial one is fine; CLI flags are merged on top.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::anomaly::AnomalyConfig;

pub const DEFAULT_CONFIG_FILE: &str = "water_report.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub cleaning: CleaningConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Raw spreadsheet or CSV to load.
    #[serde(default = "default_input_path")]
    pub path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: default_input_path(),
        }
    }
}

fn default_input_path() -> PathBuf {
    PathBuf::from("data/raw/water_consumption.xlsx")
}

/// Row acceptance rules applied by the cleaner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// First supported year (inclusive).
    #[serde(default = "default_min_year")]
    pub min_year: i32,

    /// Last supported year (inclusive).
    #[serde(default = "default_max_year")]
    pub max_year: i32,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_year: default_min_year(),
            max_year: default_max_year(),
        }
    }
}

fn default_min_year() -> i32 {
    2020
}

fn default_max_year() -> i32 {
    2023
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Year checked for anomalous consumption (the hot/dry year).
    #[serde(default = "default_target_year")]
    pub target_year: i32,

    /// Fraction above baseline that counts as anomalous (0.2 = 20%).
    #[serde(default = "default_threshold")]
    pub anomaly_threshold: f64,

    /// Years averaged into the baseline. Empty means every other year
    /// present in the data.
    #[serde(default)]
    pub baseline_years: Vec<i32>,

    /// Rows shown in top-N rankings.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_year: default_target_year(),
            anomaly_threshold: default_threshold(),
            baseline_years: Vec::new(),
            top_n: default_top_n(),
        }
    }
}

impl AnalysisConfig {
    pub fn anomaly(&self) -> AnomalyConfig {
        AnomalyConfig {
            target_year: self.target_year,
            threshold: self.anomaly_threshold,
            baseline_years: if self.baseline_years.is_empty() {
                None
            } else {
                Some(self.baseline_years.clone())
            },
        }
    }
}

fn default_target_year() -> i32 {
    2022
}

fn default_threshold() -> f64 {
    0.2
}

fn default_top_n() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where `water_long.csv` is written by `prepare`.
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,

    /// Where report CSVs, `summary.json` and `insights.md` go.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Rows printed per table preview.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            processed_dir: default_processed_dir(),
            reports_dir: default_reports_dir(),
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_preview_rows() -> usize {
    5
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the config for this run.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge CLI arguments. Only values the user actually passed override
    /// the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::RunArgs) {
        if let Some(ref input) = args.input {
            self.input.path = input.clone();
        }
        if let Some(threshold) = args.threshold {
            self.analysis.anomaly_threshold = threshold;
        }
        if let Some(year) = args.target_year {
            self.analysis.target_year = year;
        }
        if let Some(top) = args.top {
            self.analysis.top_n = top;
        }
        if let Some(ref dir) = args.out_dir {
            self.output.processed_dir = dir.clone();
        }
        if let Some(ref dir) = args.reports_dir {
            self.output.reports_dir = dir.clone();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }

    /// Write `default_toml()` to `path`, refusing to overwrite an existing
    /// file.
    pub fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            bail!(
                "{} already exists. Remove it first or edit it manually.",
                path.display()
            );
        }
        std::fs::write(path, Self::default_toml())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Path of the processed long-format CSV.
    pub fn processed_file(&self) -> PathBuf {
        self.output.processed_dir.join("water_long.csv")
    }
}
