//! Breadth CLI — one daily S&P 500 breadth update.
//!
//! `breadth` with no arguments resolves the constituents, fetches the lookback
//! window, upserts today's record into the series CSV and redraws the chart.
//! Exit code is 0 on success; each fatal error class has its own non-zero code.

use anyhow::{Context, Result};
use breadth_core::pipeline::{render_only, RunContext, RunSummary};
use breadth_core::{BreadthError, Config};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "breadth",
    about = "Daily S&P 500 breadth: % of stocks declining and % of volume in decliners"
)]
struct Cli {
    /// TOML config file. All settings have defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Series CSV path (overrides config).
    #[arg(long)]
    series: Option<PathBuf>,

    /// Chart PNG path (overrides config).
    #[arg(long)]
    chart: Option<PathBuf>,

    /// Compute this trading date (YYYY-MM-DD) instead of the latest one.
    #[arg(long)]
    date: Option<String>,

    /// Comma-separated symbols to use instead of the index membership list.
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Trading days of history to request per symbol (minimum 2).
    #[arg(long)]
    lookback_days: Option<u32>,

    /// Redraw the chart from the stored series without fetching.
    #[arg(long, default_value_t = false)]
    render_only: bool,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            let code = err
                .downcast_ref::<BreadthError>()
                .map_or(1, BreadthError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "breadth_cli=info,breadth_core=info".into()),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    if cli.render_only {
        let store = breadth_core::SeriesStore::new(&config.series_path);
        let renderer =
            breadth_core::chart::ChartRenderer::new(&config.chart_path, config.chart_style());
        let series = render_only(&store, &renderer)?;
        println!(
            "Chart redrawn from {} records: {}",
            series.len(),
            config.chart_path.display()
        );
        return Ok(());
    }

    let target = cli
        .date
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--date must be YYYY-MM-DD")?;

    let today = chrono::Local::now().date_naive();
    let ctx = RunContext::from_config(&config, today)?.with_target(target);
    let summary = breadth_core::run(&ctx)?;

    print_summary(&summary, &config);
    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(series) = &cli.series {
        config.series_path = series.clone();
    }
    if let Some(chart) = &cli.chart {
        config.chart_path = chart.clone();
    }
    if let Some(symbols) = &cli.symbols {
        config.symbols = Some(symbols.clone());
    }
    if let Some(days) = cli.lookback_days {
        config.lookback_days = days;
    }

    config.validate()?;
    Ok(config)
}

fn print_summary(summary: &RunSummary, config: &Config) {
    let stats = &summary.report.stats;
    let record = &summary.report.record;

    println!();
    println!("=== Market Breadth {} ===", summary.target);
    println!(
        "Declining:        {}/{} ({:.2}%)",
        stats.declining_count, stats.total_classified, record.pct_declining
    );
    println!(
        "Volume declining: {}/{} ({:.2}%)",
        stats.declining_volume, stats.total_volume, record.pct_volume_declining
    );
    println!("Excluded:         {}", stats.excluded.len());
    println!(
        "Series:           {} records ({} written) -> {}",
        summary.series_len,
        summary.records_written,
        config.series_path.display()
    );
    println!("Chart:            {}", config.chart_path.display());
    if summary.capitulation {
        println!();
        println!(
            "SIGNAL: both ratios at or above {}% (possible capitulation)",
            config.threshold
        );
    }
    if let Some(warning) = &summary.warning {
        println!("WARNING: {warning}");
    }
    println!();
}
