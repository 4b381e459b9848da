// Entry point and high-level CLI flow.
//
// Subcommands run one batch step each:
// - `prepare` loads and cleans the raw sheet and writes the processed CSV.
// - `analyze` answers the four business questions and writes the reports.
// - `group-by` prints an ad-hoc grouping.
// Without a subcommand the interactive menu runs: option [1] loads the
// file once, option [2] generates reports from the loaded data as many
// times as the user likes.
mod aggregate;
mod anomaly;
mod cleaner;
mod cli;
mod config;
mod error;
mod filter;
mod loader;
mod observability;
mod output;
mod reports;
mod schema;
mod types;
mod util;

use aggregate::{aggregate_by, average_by};
use anyhow::{bail, Context, Result};
use cleaner::CleanReport;
use cli::{Args, Command, FilterArgs, GroupByArgs};
use config::{Config, DEFAULT_CONFIG_FILE};
use filter::{Kpis, RecordFilter};
use once_cell::sync::Lazy;
use reports::ReportSet;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};
use types::{ConsumptionRecord, GroupRow};

// Cleaned records survive between menu choices so the sheet is only parsed
// once per session.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<Vec<ConsumptionRecord>>,
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Ask whether to go back to the menu after generating reports.
///
/// Returns `true` for `Y`, `false` for `N` or end of input.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        match io::stdin().read_line(&mut buf) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_clean_report(report: &CleanReport) {
    println!(
        "Processing dataset... ({} rows loaded, {} observations, {} kept)",
        util::format_int(report.total_rows),
        util::format_int(report.melted_rows),
        util::format_int(report.kept)
    );
    println!(
        "Note: {} dropped ({} unreadable, {} non-numeric volume, {} negative volume, {} invalid year).",
        util::format_int(report.dropped()),
        util::format_int(report.unreadable_rows),
        util::format_int(report.cast_errors),
        util::format_int(report.negative_volume),
        util::format_int(report.invalid_year)
    );
    if report.defaulted_labels > 0 {
        println!(
            "Info: {} blank business type / zone labels set to \"{}\".",
            util::format_int(report.defaulted_labels),
            cleaner::UNKNOWN_LABEL
        );
    }
    if report.unknown_status > 0 {
        println!(
            "Info: {} rows with unrecognised occupancy status.",
            util::format_int(report.unknown_status)
        );
    }
    println!();
}

fn load_with_report(cfg: &Config) -> Result<(Vec<ConsumptionRecord>, CleanReport)> {
    let (data, report) = loader::load_and_clean(&cfg.input.path, &cfg.cleaning)
        .with_context(|| format!("Failed to load {}", cfg.input.path.display()))?;
    print_clean_report(&report);
    Ok((data, report))
}

fn load(cfg: &Config) -> Result<Vec<ConsumptionRecord>> {
    load_with_report(cfg).map(|(data, _)| data)
}

fn select(data: &[ConsumptionRecord], filter: &RecordFilter) -> Result<Vec<ConsumptionRecord>> {
    if filter.is_empty() {
        return Ok(data.to_vec());
    }
    let selected = filter.apply(data);
    if selected.is_empty() {
        bail!("No data selected. Adjust the filters.");
    }
    info!(selected = selected.len(), of = data.len(), "applied filters");
    Ok(selected)
}

fn run_prepare(cfg: &Config) -> Result<()> {
    let (data, report) = load_with_report(cfg)?;
    let out = cfg.processed_file();
    output::write_csv(&out, &data)?;
    output::write_json(&cfg.output.processed_dir.join("data_quality.json"), &report)?;
    info!(path = %out.display(), records = data.len(), "wrote processed data");
    println!("Data prepared and saved to {}", out.display());
    Ok(())
}

/// Write every report file and print the previews.
fn emit_reports(reports: &ReportSet, cfg: &Config) -> Result<()> {
    let dir = &cfg.output.reports_dir;
    let rows = cfg.output.preview_rows;
    let target_year = cfg.analysis.target_year;

    output::write_csv(&dir.join("total_by_year.csv"), &reports.total_by_year)?;
    output::write_csv(&dir.join("business_by_year.csv"), &reports.business_by_year)?;
    output::write_csv(&dir.join("zone_by_year.csv"), &reports.zone_by_year)?;
    output::write_csv(&dir.join("occupancy_by_year.csv"), &reports.status_by_year)?;
    output::write_csv(&dir.join("top_business_types.csv"), &reports.top_business_types)?;
    output::write_csv(&dir.join("vacant_trend.csv"), &reports.vacant_trend_rows)?;
    output::write_csv(
        &dir.join(format!("anomalies_{target_year}_vs_baseline.csv")),
        &reports.anomalies,
    )?;
    output::write_csv(&dir.join("zone_ranking.csv"), &reports.zone_ranking)?;
    output::write_json(&dir.join("summary.json"), &reports.summary)?;
    output::write_text(
        &dir.join("insights.md"),
        &reports::render_insights(reports, target_year, cfg.analysis.top_n),
    )?;

    println!("Generating reports...");
    println!("Outputs saved to {}\n", dir.display());

    let latest = reports
        .summary
        .latest_year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "-".to_string());
    output::preview_table(
        "Report 1: Top Business Types",
        Some(&format!("Latest year: {latest}")),
        &reports.top_business_types,
        rows,
    );
    output::preview_table(
        "Report 2: Vacant Property Consumption",
        Some(&reports::vacant_trend_note(reports)),
        &reports.vacant_trend_rows,
        rows,
    );
    output::preview_table(
        &format!("Report 3: {target_year} Anomalies vs Baseline"),
        Some(&format!(
            "Flagged above +{}%",
            util::format_number(cfg.analysis.anomaly_threshold * 100.0, 0)
        )),
        &reports.anomalies,
        rows,
    );
    output::preview_table(
        "Report 4: Resource Zones by Total Usage",
        Some("All years"),
        &reports.zone_ranking,
        rows,
    );
    println!("(Full tables exported to {})\n", dir.display());
    Ok(())
}

fn print_kpis(data: &[ConsumptionRecord], target_year: i32) {
    let k = Kpis::compute(data, target_year);
    println!("Total (filters): {}", util::format_number(k.total, 0));
    println!(
        "Total in {}: {}",
        k.target_year,
        util::format_number(k.target_year_total, 0)
    );
    println!("Vacant consumption: {}", util::format_number(k.vacant_total, 0));
    println!("Rows in view: {}\n", util::format_int(k.rows));
}

fn run_analyze(cfg: &Config, filter_args: &FilterArgs) -> Result<()> {
    let data = load(cfg)?;
    let data = select(&data, &filter_args.to_filter())?;
    print_kpis(&data, cfg.analysis.target_year);
    let reports = reports::build_reports(&data, &cfg.analysis.anomaly(), cfg.analysis.top_n);
    emit_reports(&reports, cfg)
}

fn run_group_by(cfg: &Config, args: &GroupByArgs) -> Result<()> {
    let data = load(cfg)?;
    let data = select(&data, &args.filter.to_filter())?;
    let key = |r: &ConsumptionRecord| -> Vec<String> { args.by.iter().map(|d| d.value(r)).collect() };
    let agg = if args.mean {
        average_by(&data, key)
    } else {
        aggregate_by(&data, key)
    };
    // Every group unless `--top` was given.
    let limit = args.run.top.unwrap_or(agg.len());
    let rows: Vec<GroupRow> = agg
        .top_n(limit)
        .into_iter()
        .map(|(k, v)| GroupRow {
            group: k.join(" / "),
            consumption: util::format_number(v, 2),
        })
        .collect();
    let dims: Vec<String> = args.by.iter().map(|d| d.to_string()).collect();
    let title = format!(
        "{} by {}",
        if args.mean { "Mean consumption" } else { "Consumption" },
        dims.join(", ")
    );
    output::preview_table(&title, Some(&format!("{} groups", agg.len())), &rows, rows.len());
    println!(
        "Grand total: {}\n",
        util::format_number(agg.grand_total(), 2)
    );
    Ok(())
}

fn handle_init_config(path: &Path) -> Result<()> {
    Config::write_default(path)?;
    println!("Created {} with default settings.", path.display());
    Ok(())
}

/// Handle option [1]: load and clean the input file into `APP_STATE`.
fn handle_load(cfg: &Config) {
    match load(cfg) {
        Ok(data) => {
            let mut state = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
            state.data = Some(data);
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("Failed to load file: {e:#}\n");
        }
    }
}

/// Handle option [2]: generate all reports from the loaded data.
fn handle_generate_reports(cfg: &Config) {
    let data = {
        let state = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
        state.data.clone()
    };
    let Some(data) = data else {
        println!("Error: No data loaded. Please load the file first (option 1).\n");
        return;
    };
    let reports = reports::build_reports(&data, &cfg.analysis.anomaly(), cfg.analysis.top_n);
    if let Err(e) = emit_reports(&reports, cfg) {
        error!("{e:#}");
        eprintln!("Write error: {e:#}");
    }
}

fn run_menu(cfg: &Config) {
    loop {
        println!("Water Consumption Analysis ({})", cfg.input.path.display());
        println!("[1] Load the file");
        println!("[2] Generate Reports\n");
        let Some(choice) = read_choice() else {
            println!();
            break;
        };
        match choice.as_str() {
            "1" => handle_load(cfg),
            "2" => {
                println!();
                handle_generate_reports(cfg);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
}

fn run(args: Args) -> Result<()> {
    let explicit = args.config.as_deref();
    match &args.command {
        Some(Command::InitConfig) => {
            handle_init_config(explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE)))
        }
        Some(Command::Prepare(run)) => {
            let mut cfg = Config::resolve(explicit)?;
            cfg.merge_with_args(run);
            run_prepare(&cfg)
        }
        Some(Command::Analyze(a)) => {
            let mut cfg = Config::resolve(explicit)?;
            cfg.merge_with_args(&a.run);
            run_analyze(&cfg, &a.filter)
        }
        Some(Command::GroupBy(g)) => {
            let mut cfg = Config::resolve(explicit)?;
            cfg.merge_with_args(&g.run);
            run_group_by(&cfg, g)
        }
        None => {
            let cfg = Config::resolve(explicit)?;
            if explicit.is_none() && !Path::new(DEFAULT_CONFIG_FILE).exists() {
                warn!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            }
            run_menu(&cfg);
            Ok(())
        }
    }
}

fn main() {
    let args = Args::parse_args();
    observability::init_tracing(args.log_directive());
    info!("water_report v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args) {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
