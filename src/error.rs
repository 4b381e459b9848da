// Error types for the load and clean stages.
//
// Both are fatal for a run. Row-level problems never surface here; the
// cleaner drops those rows and counts them in its `CleanReport`.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported input format '{0}' (expected csv, xlsx, xlsm, xlsb, xls or ods)")]
    UnsupportedFormat(String),

    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet has no worksheets")]
    NoWorksheet,

    #[error("input has no header row")]
    EmptySheet,

    #[error("missing expected columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("no usable rows: all {total_rows} input rows were dropped during cleaning")]
    NoUsableRows { total_rows: usize },
}
