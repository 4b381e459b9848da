use crate::cleaner::{self, CleanReport};
use crate::config::CleaningConfig;
use crate::error::LoadError;
use crate::schema::ColumnMap;
use crate::types::{ConsumptionRecord, RawTable};
use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, Trim};
use std::path::Path;
use tracing::{debug, info, warn};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read the first worksheet (or the whole CSV file) into a `RawTable`.
///
/// The header row is validated against the column aliases up front so a
/// file without, say, a resource zone column fails here rather than
/// producing an empty dataset later.
pub fn load_table(path: &Path) -> Result<RawTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let (headers, rows, unreadable) = match ext.as_str() {
        "csv" | "txt" => read_csv(path)?,
        e if SPREADSHEET_EXTENSIONS.contains(&e) => read_spreadsheet(path)?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LoadError::EmptySheet);
    }
    if unreadable > 0 {
        warn!(rows = unreadable, "skipped unreadable rows");
    }

    let columns = ColumnMap::resolve(&headers)?;
    debug!(?columns, "resolved columns");
    info!(
        path = %path.display(),
        rows = rows.len(),
        layout = ?columns.layout,
        "loaded raw table"
    );

    Ok(RawTable {
        source: path.to_path_buf(),
        headers,
        rows,
        unreadable_rows: unreadable,
        columns,
    })
}

type Sheet = (Vec<String>, Vec<Vec<String>>, usize);

fn read_csv(path: &Path) -> Result<Sheet, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    let mut unreadable = 0usize;
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "unreadable CSV record");
                unreadable += 1;
                continue;
            }
        };
        let row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(row);
    }
    Ok((headers, rows, unreadable))
}

fn read_spreadsheet(path: &Path) -> Result<Sheet, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LoadError::NoWorksheet)??;

    let mut iter = range.rows();
    let headers: Vec<String> = match iter.next() {
        Some(first) => first.iter().map(cell_text).collect(),
        None => return Err(LoadError::EmptySheet),
    };
    let rows = iter
        .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();
    Ok((headers, rows, 0))
}

/// Render a spreadsheet cell as the text a CSV export would contain.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // `f64`'s Display already drops a trailing `.0` (2021.0 -> "2021").
        other => other.to_string(),
    }
}

/// Load and clean in one step; the pairing used by both the CLI
/// subcommands and the interactive menu.
pub fn load_and_clean(
    path: &Path,
    cfg: &CleaningConfig,
) -> anyhow::Result<(Vec<ConsumptionRecord>, CleanReport)> {
    let table = load_table(path)?;
    let (records, report) = cleaner::clean(&table, cfg)?;
    Ok((records, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    /// Minimal single-sheet workbook. Numeric-looking cells are stored as
    /// numbers, everything else as inline strings; an empty row slice leaves
    /// a gap in the sheet.
    fn xlsx_file(rows: &[&[&str]]) -> NamedTempFile {
        use zip::write::FileOptions;
        use zip::ZipWriter;

        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, cells) in rows.iter().enumerate() {
            if cells.is_empty() {
                continue;
            }
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, text) in cells.iter().enumerate() {
                let cell_ref = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                if text.is_empty() {
                    continue;
                }
                if text.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{cell_ref}"><v>{text}</v></c>"#));
                } else {
                    sheet.push_str(&format!(
                        r#"<c r="{cell_ref}" t="inlineStr"><is><t>{text}</t></is></c>"#
                    ));
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
            ),
            ("xl/worksheets/sheet1.xml", sheet),
        ];

        let mut f = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        {
            let mut zip = ZipWriter::new(f.as_file_mut());
            let options = FileOptions::default();
            for (name, body) in &parts {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        f
    }

    #[test]
    fn loads_wide_workbook_with_numeric_year_headers() {
        let f = xlsx_file(&[
            &["SPID", "Type of Business", "Zone", "Status", "2021", "2022"],
            &["S1", "Retail", "North", "Vacant", "100", "120.5"],
            &[],
            &["S2", "Office", "South", "Occupied", "50", ""],
        ]);
        let table = load_table(f.path()).unwrap();
        assert_eq!(table.headers[4], "2021");
        assert_eq!(table.headers[5], "2022");
        assert_eq!(table.columns.layout, crate::schema::Layout::Wide);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][5], "120.5");
        assert_eq!(table.rows[1][1], "Office");
        assert_eq!(table.rows[1][5], "");

        let (records, report) = load_and_clean(f.path(), &CleaningConfig::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(report.cast_errors, 1);
        assert_eq!(records[0].year, 2021);
        assert_eq!(records[0].consumption_volume, 100.0);
        assert_eq!(records[1].consumption_volume, 120.5);
    }

    #[test]
    fn empty_workbook_sheet_is_rejected() {
        let f = xlsx_file(&[]);
        let err = load_table(f.path()).unwrap_err();
        assert!(matches!(err, LoadError::EmptySheet));
    }

    #[test]
    fn spreadsheet_cells_render_like_csv_text() {
        assert_eq!(cell_text(&Data::Float(2021.0)), "2021");
        assert_eq!(cell_text(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::String("  Retail ".to_string())), "Retail");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn loads_long_csv_and_skips_blank_rows() {
        let f = csv_file(
            "Business Type,Resource Zone,Year,Consumption\n\
             Retail,A,2021,10\n\
             ,,,\n\
             Retail,B,2022,12\n",
        );
        let table = load_table(f.path()).unwrap();
        assert_eq!(table.headers.len(), 4);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][1], "B");
    }

    #[test]
    fn undecodable_csv_records_are_counted() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(b"Business Type,Zone,Year,Consumption\nRetail,A,2021,10\nRe\xfftail,A,2021,5\nRetail,B,2022,7\n")
            .unwrap();
        let table = load_table(f.path()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.unreadable_rows, 1);

        let (records, report) = load_and_clean(f.path(), &CleaningConfig::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.unreadable_rows, 1);
        assert_eq!(report.dropped(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_table(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let f = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let err = load_table(f.path()).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(ref e) if e == "parquet"));
    }

    #[test]
    fn header_without_required_columns_fails() {
        let f = csv_file("Name,Notes\nfoo,bar\n");
        let err = load_table(f.path()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumns(_)));
    }

    #[test]
    fn empty_file_has_no_header() {
        let f = csv_file("");
        let err = load_table(f.path()).unwrap_err();
        assert!(matches!(err, LoadError::EmptySheet));
    }

    #[test]
    fn load_and_clean_runs_both_stages() {
        let f = csv_file(
            "Type of Business,Zone,Status,2021,2022\n\
             Retail,A,Vacant,100,120\n",
        );
        let (records, report) = load_and_clean(f.path(), &CleaningConfig::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(report.kept, 2);
        assert_eq!(report.total_rows, 1);
    }

    #[test]
    fn processed_output_loads_back_as_long_layout() {
        let raw = csv_file(
            "SPID,Account Type,Occupancy Status,Resource Zone,Usage 2020,Usage 2021\n\
             S1,Retail,VACANT ,North,10,12.5\n",
        );
        let (records, _) = load_and_clean(raw.path(), &CleaningConfig::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("water_long.csv");
        crate::output::write_csv(&processed, &records).unwrap();

        let table = load_table(&processed).unwrap();
        assert_eq!(table.columns.layout, crate::schema::Layout::Long);
        let (reloaded, _) = load_and_clean(&processed, &CleaningConfig::default()).unwrap();
        assert_eq!(reloaded, records);
    }
}
