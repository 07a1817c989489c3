//! Fetch orchestrator: runs every constituent through the provider with a
//! bounded retry, and splits the outcome into usable series and failures.

use super::provider::{DailyBar, DataError, DataProvider, DownloadProgress};
use crate::error::{BreadthError, PartialDataWarning};
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::BTreeMap;
use std::time::Duration;

/// Calendar range requested from the provider: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    /// Window covering `lookback_days` trading days up to, not including, `end`.
    ///
    /// Twice as many calendar days are requested to absorb weekends and
    /// holidays. `lookback_days` below 2 is raised to 2, the minimum for a
    /// day-over-day comparison.
    pub fn trailing(end: NaiveDate, lookback_days: u32) -> Self {
        let calendar_days = i64::from(lookback_days.max(2)) * 2;
        Self {
            start: end - ChronoDuration::days(calendar_days),
            end,
        }
    }
}

/// Bounded retry around a single provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
    /// Upper bound on honouring a provider's `Retry-After` hint.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_millis(500),
            max_rate_limit_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
            max_rate_limit_wait: Duration::ZERO,
        }
    }

    /// Pause before retrying after `err`.
    ///
    /// A rate limit waits for the provider's hint, capped at
    /// `max_rate_limit_wait` and never shorter than `delay`.
    pub fn backoff(&self, err: &DataError) -> Duration {
        match err {
            DataError::RateLimited { retry_after_secs } => Duration::from_secs(*retry_after_secs)
                .min(self.max_rate_limit_wait)
                .max(self.delay),
            _ => self.delay,
        }
    }
}

/// Fetch one symbol, retrying retryable errors and empty results.
///
/// Bars without a close are dropped and the rest sorted by date, so callers
/// always get a clean ascending series.
pub fn fetch_with_retry(
    provider: &dyn DataProvider,
    symbol: &str,
    window: FetchWindow,
    policy: &RetryPolicy,
) -> Result<Vec<DailyBar>, DataError> {
    let mut attempt = 0;
    loop {
        let result = provider.fetch(symbol, window.start, window.end).and_then(|fetched| {
            let mut bars: Vec<DailyBar> =
                fetched.bars.into_iter().filter(DailyBar::has_close).collect();
            if bars.is_empty() {
                return Err(DataError::EmptyResponse {
                    symbol: symbol.to_string(),
                });
            }
            bars.sort_by_key(|b| b.date);
            bars.dedup_by_key(|b| b.date);
            Ok(bars)
        });

        match result {
            Ok(bars) => return Ok(bars),
            Err(e) if e.is_retryable() && attempt < policy.max_retries && provider.is_available() => {
                attempt += 1;
                let wait = policy.backoff(&e);
                tracing::debug!(
                    "retrying {symbol} in {}ms after error ({attempt}/{}): {e}",
                    wait.as_millis(),
                    policy.max_retries
                );
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bars per symbol that survived the fetch, plus the symbols that did not.
#[derive(Debug)]
pub struct FetchOutcome {
    pub bars: BTreeMap<String, Vec<DailyBar>>,
    pub warning: PartialDataWarning,
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.warning.failures.is_empty()
    }
}

/// Fetch every symbol over `window`.
///
/// Individual failures are collected, not raised. Once the provider reports
/// itself unavailable (circuit breaker open) the remaining symbols are marked
/// failed without a request. If no symbol yields data the whole fetch fails
/// with [`BreadthError::DataUnavailable`].
pub fn fetch_universe(
    provider: &dyn DataProvider,
    symbols: &[String],
    window: FetchWindow,
    policy: &RetryPolicy,
    progress: &dyn DownloadProgress,
) -> Result<FetchOutcome, BreadthError> {
    let total = symbols.len();
    let mut bars = BTreeMap::new();
    let mut failures: Vec<(String, DataError)> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        if !provider.is_available() {
            for sym in &symbols[i..] {
                failures.push((sym.clone(), DataError::CircuitBreakerTripped));
            }
            tracing::warn!(
                skipped = total - i,
                "provider unavailable, skipping remaining symbols"
            );
            break;
        }

        progress.on_start(symbol, i, total);
        match fetch_with_retry(provider, symbol, window, policy) {
            Ok(series) => {
                progress.on_complete(symbol, i, total, &Ok(()));
                bars.insert(symbol.clone(), series);
            }
            Err(e) => {
                let report = Err(e);
                progress.on_complete(symbol, i, total, &report);
                if let Err(e) = report {
                    failures.push((symbol.clone(), e));
                }
            }
        }
    }

    progress.on_batch_complete(bars.len(), failures.len(), total);

    if bars.is_empty() {
        let detail = failures
            .first()
            .map(|(s, e)| format!("; first failure {s}: {e}"))
            .unwrap_or_default();
        return Err(BreadthError::DataUnavailable(format!(
            "{} from {} returned no data for any of {total} symbols{detail}",
            window_label(window),
            provider.name(),
        )));
    }

    Ok(FetchOutcome {
        bars,
        warning: PartialDataWarning {
            requested: total,
            failures,
        },
    })
}

fn window_label(window: FetchWindow) -> String {
    format!("{}..{}", window.start, window.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, FetchResult, NoProgress};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(date: &str, close: f64) -> DailyBar {
        DailyBar {
            date: d(date),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    /// Provider that pops a scripted response per call for each symbol.
    struct Scripted {
        responses: Mutex<HashMap<String, Vec<Result<Vec<DailyBar>, DataError>>>>,
        calls: Mutex<Vec<String>>,
        /// Report unavailable once this many requests have been made.
        trip_after: Option<usize>,
    }

    impl Scripted {
        fn new(script: Vec<(&str, Vec<Result<Vec<DailyBar>, DataError>>)>) -> Self {
            Self {
                responses: Mutex::new(
                    script
                        .into_iter()
                        .map(|(s, mut r)| {
                            r.reverse();
                            (s.to_string(), r)
                        })
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
                trip_after: None,
            }
        }

        fn calls(&self, symbol: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|s| *s == symbol).count()
        }
    }

    impl DataProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(&self, symbol: &str, _: NaiveDate, _: NaiveDate) -> Result<FetchResult, DataError> {
            self.calls.lock().unwrap().push(symbol.to_string());
            let next = self
                .responses
                .lock()
                .unwrap()
                .get_mut(symbol)
                .and_then(|r| r.pop())
                .unwrap_or_else(|| {
                    Err(DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    })
                });
            next.map(|bars| FetchResult {
                symbol: symbol.to_string(),
                bars,
                source: DataSource::Other,
            })
        }

        fn is_available(&self) -> bool {
            self.trip_after
                .map_or(true, |n| self.calls.lock().unwrap().len() < n)
        }
    }

    fn window() -> FetchWindow {
        FetchWindow::trailing(d("2025-04-08"), 7)
    }

    #[test]
    fn trailing_window_doubles_lookback_and_enforces_minimum() {
        let w = FetchWindow::trailing(d("2025-04-08"), 7);
        assert_eq!(w.start, d("2025-03-25"));
        assert_eq!(w.end, d("2025-04-08"));

        let w = FetchWindow::trailing(d("2025-04-08"), 0);
        assert_eq!(w.start, d("2025-04-04"));
    }

    #[test]
    fn single_retry_absorbs_transient_error() {
        let provider = Scripted::new(vec![(
            "AAPL",
            vec![
                Err(DataError::NetworkUnreachable("reset".into())),
                Ok(vec![bar("2025-04-03", 1.0), bar("2025-04-04", 2.0)]),
            ],
        )]);
        let bars = fetch_with_retry(&provider, "AAPL", window(), &RetryPolicy::no_delay(1)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(provider.calls("AAPL"), 2);
    }

    #[test]
    fn empty_result_is_retried_once_then_reported() {
        let provider = Scripted::new(vec![("AAPL", vec![Ok(vec![]), Ok(vec![])])]);
        let err = fetch_with_retry(&provider, "AAPL", window(), &RetryPolicy::no_delay(1)).unwrap_err();
        assert!(matches!(err, DataError::EmptyResponse { .. }));
        assert_eq!(provider.calls("AAPL"), 2);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let provider = Scripted::new(vec![("ZZZZ", vec![])]);
        let err = fetch_with_retry(&provider, "ZZZZ", window(), &RetryPolicy::no_delay(3)).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
        assert_eq!(provider.calls("ZZZZ"), 1);
    }

    #[test]
    fn bars_without_close_are_dropped_and_sorted() {
        let provider = Scripted::new(vec![(
            "AAPL",
            vec![Ok(vec![
                bar("2025-04-04", 2.0),
                bar("2025-04-03", f64::NAN),
                bar("2025-04-02", 1.0),
            ])],
        )]);
        let bars = fetch_with_retry(&provider, "AAPL", window(), &RetryPolicy::no_delay(0)).unwrap();
        let dates: Vec<_> = bars.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d("2025-04-02"), d("2025-04-04")]);
    }

    #[test]
    fn partial_failure_is_collected_not_raised() {
        let provider = Scripted::new(vec![
            ("AAPL", vec![Ok(vec![bar("2025-04-03", 1.0), bar("2025-04-04", 2.0)])]),
        ]);
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let outcome =
            fetch_universe(&provider, &symbols, window(), &RetryPolicy::no_delay(1), &NoProgress)
                .unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.bars.len(), 1);
        assert_eq!(outcome.warning.failed_symbols(), vec!["MSFT"]);
        assert_eq!(outcome.warning.requested, 2);
    }

    #[test]
    fn nothing_fetched_is_data_unavailable() {
        let provider = Scripted::new(vec![]);
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let err =
            fetch_universe(&provider, &symbols, window(), &RetryPolicy::no_delay(1), &NoProgress)
                .unwrap_err();
        assert!(matches!(err, BreadthError::DataUnavailable(_)));
    }

    #[test]
    fn unavailable_provider_skips_remaining_symbols() {
        let mut provider = Scripted::new(vec![]);
        provider.trip_after = Some(0);
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let err =
            fetch_universe(&provider, &symbols, window(), &RetryPolicy::no_delay(1), &NoProgress)
                .unwrap_err();
        assert!(matches!(err, BreadthError::DataUnavailable(_)));
        assert_eq!(provider.calls("AAPL"), 0);
    }

    #[test]
    fn progress_sees_every_attempted_symbol() {
        struct Counting(RefCell<Vec<String>>);
        impl DownloadProgress for Counting {
            fn on_start(&self, symbol: &str, _: usize, _: usize) {
                self.0.borrow_mut().push(symbol.to_string());
            }
            fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<(), DataError>) {}
            fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
        }

        let provider = Scripted::new(vec![("AAPL", vec![Ok(vec![bar("2025-04-04", 1.0)])])]);
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let progress = Counting(RefCell::new(Vec::new()));
        fetch_universe(&provider, &symbols, window(), &RetryPolicy::no_delay(0), &progress).unwrap();
        assert_eq!(*progress.0.borrow(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn breaker_opening_mid_run_keeps_earlier_bars() {
        let mut provider = Scripted::new(vec![
            ("AAPL", vec![Ok(vec![bar("2025-04-03", 1.0), bar("2025-04-04", 2.0)])]),
            ("MSFT", vec![Ok(vec![bar("2025-04-03", 3.0), bar("2025-04-04", 2.0)])]),
            ("NVDA", vec![Ok(vec![bar("2025-04-04", 5.0)])]),
        ]);
        provider.trip_after = Some(2);
        let symbols: Vec<String> = ["AAPL", "MSFT", "NVDA", "AMZN"].map(String::from).to_vec();

        let outcome =
            fetch_universe(&provider, &symbols, window(), &RetryPolicy::no_delay(1), &NoProgress)
                .unwrap();

        assert_eq!(outcome.bars.keys().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
        assert_eq!(outcome.bars["AAPL"].len(), 2);
        assert_eq!(outcome.warning.failed_symbols(), vec!["NVDA", "AMZN"]);
        assert!(outcome
            .warning
            .failures
            .iter()
            .all(|(_, e)| matches!(e, DataError::CircuitBreakerTripped)));
        assert_eq!(provider.calls("NVDA"), 0);
        assert_eq!(provider.calls("AMZN"), 0);
    }

    #[test]
    fn rate_limit_backoff_follows_the_hint_within_the_cap() {
        let policy = RetryPolicy::default();
        let limited = |secs| DataError::RateLimited { retry_after_secs: secs };

        assert_eq!(policy.backoff(&limited(5)), Duration::from_secs(5));
        assert_eq!(policy.backoff(&limited(3600)), Duration::from_secs(30));
        assert_eq!(policy.backoff(&limited(0)), Duration::from_millis(500));
        assert_eq!(
            policy.backoff(&DataError::NetworkUnreachable("reset".into())),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn rate_limited_request_waits_before_retrying() {
        let provider = Scripted::new(vec![(
            "AAPL",
            vec![
                Err(DataError::RateLimited { retry_after_secs: 2 }),
                Ok(vec![bar("2025-04-04", 1.0)]),
            ],
        )]);
        let policy = RetryPolicy {
            max_retries: 1,
            delay: Duration::ZERO,
            max_rate_limit_wait: Duration::from_millis(50),
        };

        let started = std::time::Instant::now();
        let bars = fetch_with_retry(&provider, "AAPL", window(), &policy).unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(provider.calls("AAPL"), 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
