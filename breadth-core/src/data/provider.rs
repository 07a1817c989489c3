//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over market data sources so the pipeline can
//! run against Yahoo Finance in production and a scripted provider in tests.

use chrono::NaiveDate;
use thiserror::Error;

/// Daily OHLCV bar for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl DailyBar {
    /// A bar with no close price cannot take part in a day-over-day comparison.
    pub fn has_close(&self) -> bool {
        self.close.is_finite()
    }
}

/// Structured error types for a single provider request.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no bars returned for {symbol}")]
    EmptyResponse { symbol: String },

    #[error("provider returned HTTP {status} for {symbol}")]
    HttpStatus { symbol: String, status: u16 },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::NetworkUnreachable(_)
            | DataError::RateLimited { .. }
            | DataError::EmptyResponse { .. } => true,
            DataError::HttpStatus { status, .. } => *status >= 500,
            DataError::ResponseFormatChanged(_)
            | DataError::SymbolNotFound { .. }
            | DataError::CircuitBreakerTripped
            | DataError::Other(_) => false,
        }
    }
}

/// Result of a successful data fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<DailyBar>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    YahooFinance,
    /// Any non-network source: local files, fixtures, in-memory providers.
    Other,
}

/// Trait for market data providers.
///
/// `fetch` is the `get_daily_bars(symbol, start, end)` query contract. The end
/// date is exclusive. Implementations make a single attempt; retries live in
/// [`super::fetch::RetryPolicy`].
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV bars for a symbol over `[start, end)`.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

/// Progress callback for multi-symbol operations.
pub trait DownloadProgress {
    /// Called when starting to fetch a symbol.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol fetch completes.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<(), DataError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes through `tracing`.
///
/// Per-symbol lines go to `debug`, so a 500-symbol run stays quiet at the
/// default `info` level.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        tracing::debug!("[{}/{}] fetching {symbol}", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<(), DataError>,
    ) {
        match result {
            Ok(()) => tracing::debug!("ok: {symbol}"),
            Err(e) => tracing::debug!("fail: {symbol}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("fetch complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Progress reporter that does nothing.
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _symbol: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _symbol: &str,
        _index: usize,
        _total: usize,
        _result: &Result<(), DataError>,
    ) {
    }

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(DataError::NetworkUnreachable("timeout".into()).is_retryable());
        assert!(DataError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(DataError::EmptyResponse { symbol: "AAPL".into() }.is_retryable());
        assert!(DataError::HttpStatus { symbol: "AAPL".into(), status: 502 }.is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!DataError::SymbolNotFound { symbol: "ZZZZ".into() }.is_retryable());
        assert!(!DataError::CircuitBreakerTripped.is_retryable());
        assert!(!DataError::HttpStatus { symbol: "AAPL".into(), status: 404 }.is_retryable());
    }

    #[test]
    fn nan_close_is_not_a_close() {
        let bar = DailyBar {
            date: NaiveDate::from_ymd_opt(2025, 4, 4).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: f64::NAN,
            volume: 0,
        };
        assert!(!bar.has_close());
    }
}
