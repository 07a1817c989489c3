//! One breadth update: resolve → fetch → compute → store → render.
//!
//! Everything a run needs is carried in a [`RunContext`] built for that run,
//! so tests can swap the constituent source and the provider.

use crate::breadth::{compute_breadth, compute_history, latest_common_date, BreadthReport};
use crate::chart::ChartRenderer;
use crate::config::Config;
use crate::data::constituents::{
    resolve_constituents, ConstituentSource, CsvFileSource, RemoteCsvSource, StaticSource,
};
use crate::data::fetch::{fetch_universe, FetchWindow, RetryPolicy};
use crate::data::provider::{DataProvider, DownloadProgress, LogProgress};
use crate::data::{CircuitBreaker, YahooProvider};
use crate::error::{BreadthError, PartialDataWarning};
use crate::store::{BreadthSeries, SeriesStore};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

/// Collaborators and settings for a single run.
pub struct RunContext {
    pub constituents: Box<dyn ConstituentSource>,
    pub provider: Box<dyn DataProvider>,
    pub progress: Box<dyn DownloadProgress>,
    pub store: SeriesStore,
    pub renderer: ChartRenderer,
    pub retry: RetryPolicy,
    pub lookback_days: u32,
    pub threshold: f64,
    /// Last calendar day fetched; normally the local date. Its session is
    /// included, so a run after the close records that day.
    pub today: NaiveDate,
    /// Compute this date instead of the latest common trading date.
    pub target: Option<NaiveDate>,
}

impl RunContext {
    /// Wire the production collaborators from `config`.
    ///
    /// Constituents come from `symbols` if set, else `constituents_file`,
    /// else `constituents_url`.
    pub fn from_config(config: &Config, today: NaiveDate) -> Result<Self, BreadthError> {
        config.validate()?;

        let constituents: Box<dyn ConstituentSource> = match (&config.symbols, &config.constituents_file) {
            (Some(symbols), _) => Box::new(StaticSource::new(symbols.iter().cloned())),
            (None, Some(path)) => Box::new(CsvFileSource::new(path)),
            (None, None) => Box::new(RemoteCsvSource::new(
                config.constituents_url.clone(),
                config.request_timeout(),
            )?),
        };

        let breaker = Arc::new(CircuitBreaker::default_provider());
        let provider = YahooProvider::new(breaker, config.request_timeout())
            .map_err(|e| BreadthError::DataUnavailable(e.to_string()))?;

        Ok(Self::new(config, today, constituents, Box::new(provider)))
    }

    /// Context with caller-supplied constituent source and provider.
    pub fn new(
        config: &Config,
        today: NaiveDate,
        constituents: Box<dyn ConstituentSource>,
        provider: Box<dyn DataProvider>,
    ) -> Self {
        Self {
            constituents,
            provider,
            progress: Box::new(LogProgress),
            store: SeriesStore::new(&config.series_path),
            renderer: ChartRenderer::new(&config.chart_path, config.chart_style()),
            retry: config.retry_policy(),
            lookback_days: config.lookback_days,
            threshold: config.threshold,
            today,
            target: None,
        }
    }

    pub fn with_target(mut self, target: Option<NaiveDate>) -> Self {
        self.target = target;
        self
    }

    /// Half-open fetch window whose last day is the target, or `today`.
    pub fn window(&self) -> FetchWindow {
        let last = self.target.unwrap_or(self.today);
        FetchWindow::trailing(last + Duration::days(1), self.lookback_days)
    }
}

/// What a successful run did.
#[derive(Debug)]
pub struct RunSummary {
    pub target: NaiveDate,
    pub report: BreadthReport,
    /// Records upserted this run: 1, or more when seeding an empty store.
    pub records_written: usize,
    pub series_len: usize,
    pub capitulation: bool,
    pub warning: Option<PartialDataWarning>,
}

/// Run one full update.
pub fn run(ctx: &RunContext) -> Result<RunSummary, BreadthError> {
    let symbols = resolve_constituents(ctx.constituents.as_ref())?;

    // Fail on a corrupt store before spending a few hundred requests.
    let mut series = ctx.store.load()?;
    let seeding = series.is_empty();

    let window = ctx.window();
    tracing::info!(
        symbols = symbols.len(),
        start = %window.start,
        end = %window.end,
        provider = ctx.provider.name(),
        "fetching daily bars"
    );
    let outcome = fetch_universe(
        ctx.provider.as_ref(),
        &symbols,
        window,
        &ctx.retry,
        ctx.progress.as_ref(),
    )?;
    if outcome.is_partial() {
        tracing::warn!("partial data: {}", outcome.warning);
    }

    let target = match ctx.target {
        Some(date) => date,
        None => latest_common_date(&outcome.bars).ok_or_else(|| {
            BreadthError::DataUnavailable("fetched series contain no bars".into())
        })?,
    };

    let mut reports = if seeding {
        tracing::info!("series store is empty; seeding from the fetched window");
        compute_history(&outcome.bars)
    } else {
        Vec::new()
    };
    reports.retain(|r| r.record.date != target);
    let report = compute_breadth(&outcome.bars, target);
    reports.push(report.clone());

    for r in &reports {
        if let Some(old) = series.upsert(r.record) {
            tracing::info!(date = %old.date, "replacing existing record");
        }
        if r.record.is_capitulation(ctx.threshold) {
            tracing::warn!(
                date = %r.record.date,
                pct_declining = r.record.pct_declining,
                pct_volume_declining = r.record.pct_volume_declining,
                "capitulation signal: both ratios at or above {}%",
                ctx.threshold
            );
        }
    }

    tracing::info!(
        date = %target,
        declining = report.stats.declining_count,
        classified = report.stats.total_classified,
        pct_declining = format_args!("{:.2}", report.record.pct_declining),
        pct_volume_declining = format_args!("{:.2}", report.record.pct_volume_declining),
        "breadth computed"
    );

    ctx.store.save(&series)?;
    tracing::info!(path = %ctx.store.path().display(), records = series.len(), "series saved");

    ctx.renderer.render_to_file(&series)?;

    let warning = outcome.is_partial().then_some(outcome.warning);
    Ok(RunSummary {
        target,
        capitulation: report.record.is_capitulation(ctx.threshold),
        report,
        records_written: reports.len(),
        series_len: series.len(),
        warning,
    })
}

/// Re-draw the chart from the stored series without fetching.
pub fn render_only(store: &SeriesStore, renderer: &ChartRenderer) -> Result<BreadthSeries, BreadthError> {
    let series = store.load()?;
    renderer.render_to_file(&series)?;
    Ok(series)
}
