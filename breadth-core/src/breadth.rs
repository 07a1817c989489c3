//! Breadth calculator.
//!
//! For a target date, each symbol is compared against its own previous bar
//! (not a calendar offset, so per-symbol gaps and holidays are skipped). A
//! symbol is "declining" when its close fell. Two ratios come out:
//!
//! - `pct_declining`: declining symbols / classified symbols
//! - `pct_volume_declining`: target-day volume of declining symbols / total
//!   target-day volume of classified symbols
//!
//! Symbols without a bar on the target date, or without an earlier bar, are
//! excluded from both numerator and denominator.

use crate::data::provider::DailyBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Daily bars per symbol, each series sorted ascending by date.
pub type SymbolBars = BTreeMap<String, Vec<DailyBar>>;

/// Default capitulation threshold, in percent.
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// Breadth ratios for one trading date. Both values lie in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreadthRecord {
    pub date: NaiveDate,
    pub pct_declining: f64,
    pub pct_volume_declining: f64,
}

impl BreadthRecord {
    /// Both ratios at or above `threshold`: broad, heavy selling.
    pub fn is_capitulation(&self, threshold: f64) -> bool {
        self.pct_declining >= threshold && self.pct_volume_declining >= threshold
    }

    /// Both ratios finite and within [0, 100].
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        in_range(self.pct_declining) && in_range(self.pct_volume_declining)
    }
}

/// Raw tallies behind a [`BreadthRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreadthStats {
    pub declining_count: usize,
    pub total_classified: usize,
    pub declining_volume: u64,
    pub total_volume: u64,
    /// Symbols with no bar on the target date or no earlier bar to compare to.
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreadthReport {
    pub record: BreadthRecord,
    pub stats: BreadthStats,
}

/// `100 * part / whole`, or 0 when `whole` is 0.
fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (100.0 * part / whole).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// The target-day bar and the symbol's own previous bar, if both exist.
fn target_and_prior(series: &[DailyBar], target: NaiveDate) -> Option<(&DailyBar, &DailyBar)> {
    let idx = series.binary_search_by_key(&target, |b| b.date).ok()?;
    let prior = series.get(idx.checked_sub(1)?)?;
    let current = &series[idx];
    (current.has_close() && prior.has_close()).then_some((current, prior))
}

/// Compute breadth for `target`.
///
/// Never fails: with nothing to classify both ratios are 0 and a warning is
/// logged.
pub fn compute_breadth(bars: &SymbolBars, target: NaiveDate) -> BreadthReport {
    let mut stats = BreadthStats::default();

    for (symbol, series) in bars {
        let Some((current, prior)) = target_and_prior(series, target) else {
            stats.excluded.push(symbol.clone());
            continue;
        };

        stats.total_classified += 1;
        stats.total_volume += current.volume;
        if current.close < prior.close {
            stats.declining_count += 1;
            stats.declining_volume += current.volume;
        }
    }

    if stats.total_classified == 0 {
        tracing::warn!(%target, "no symbol has bars on {target} and a prior day; breadth set to 0");
    }

    let record = BreadthRecord {
        date: target,
        pct_declining: percent(stats.declining_count as f64, stats.total_classified as f64),
        pct_volume_declining: percent(stats.declining_volume as f64, stats.total_volume as f64),
    };

    BreadthReport { record, stats }
}

/// Dates held by more than half of the symbols, ascending.
fn majority_dates(bars: &SymbolBars) -> Vec<NaiveDate> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for series in bars.values() {
        let unique: BTreeSet<NaiveDate> = series.iter().map(|b| b.date).collect();
        for date in unique {
            *counts.entry(date).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(_, n)| n * 2 > bars.len())
        .map(|(date, _)| date)
        .collect()
}

/// The most recent trading date shared by a majority of symbols.
///
/// A few symbols carrying a stray extra day do not move the target. Falls back
/// to the latest date of any series when no date has majority coverage, and
/// returns `None` only when there are no bars at all.
pub fn latest_common_date(bars: &SymbolBars) -> Option<NaiveDate> {
    majority_dates(bars).last().copied().or_else(|| {
        bars.values()
            .filter_map(|series| series.last().map(|b| b.date))
            .max()
    })
}

/// Breadth for every majority-held date in the fetched window that has at
/// least one classifiable symbol. Used to seed an empty series.
pub fn compute_history(bars: &SymbolBars) -> Vec<BreadthReport> {
    let mut dates = majority_dates(bars);
    if dates.is_empty() {
        dates = bars
            .values()
            .flat_map(|series| series.iter().map(|b| b.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
    }

    dates
        .into_iter()
        .filter(|date| {
            bars.values()
                .any(|series| series.first().is_some_and(|b| b.date < *date))
        })
        .map(|date| compute_breadth(bars, date))
        .filter(|report| report.stats.total_classified > 0)
        .collect()
}
