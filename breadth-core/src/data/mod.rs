//! Constituent resolution and market data fetching

pub mod circuit_breaker;
pub mod constituents;
pub mod fetch;
pub mod provider;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use constituents::{
    resolve_constituents, ConstituentSource, CsvFileSource, RemoteCsvSource, StaticSource,
};
pub use fetch::{fetch_universe, fetch_with_retry, FetchOutcome, FetchWindow, RetryPolicy};
pub use provider::{DailyBar, DataError, DataProvider, DownloadProgress, LogProgress};
pub use yahoo::YahooProvider;
