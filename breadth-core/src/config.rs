//! Run configuration.
//!
//! Every field has a default, so a bare invocation needs no file. A TOML file
//! may override any subset:
//!
//! ```toml
//! lookback_days = 10
//! series_path = "data/breadth.csv"
//! chart_path = "market_trend.png"
//! threshold = 80.0
//! ```

use crate::breadth::DEFAULT_THRESHOLD;
use crate::chart::ChartStyle;
use crate::data::constituents::DEFAULT_CONSTITUENTS_URL;
use crate::data::fetch::RetryPolicy;
use crate::error::BreadthError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// CSV table with a `Symbol` column.
    pub constituents_url: String,
    /// Local constituents CSV; takes precedence over `constituents_url`.
    pub constituents_file: Option<PathBuf>,
    /// Fixed symbol list; takes precedence over both tables.
    pub symbols: Option<Vec<String>>,
    /// Trading days of history requested per symbol (minimum 2).
    pub lookback_days: u32,
    /// Timeout for each HTTP request.
    pub request_timeout_secs: u64,
    /// Additional attempts per symbol after a transient failure.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub series_path: PathBuf,
    pub chart_path: PathBuf,
    /// Capitulation threshold in percent.
    pub threshold: f64,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            constituents_url: DEFAULT_CONSTITUENTS_URL.to_string(),
            constituents_file: None,
            symbols: None,
            lookback_days: 7,
            request_timeout_secs: 30,
            max_retries: 1,
            retry_delay_ms: 500,
            series_path: PathBuf::from("data/breadth.csv"),
            chart_path: PathBuf::from("market_trend.png"),
            threshold: DEFAULT_THRESHOLD,
            chart_width: 1200,
            chart_height: 600,
        }
    }
}

impl Config {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BreadthError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BreadthError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, BreadthError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BreadthError::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BreadthError> {
        if self.lookback_days < 2 {
            return Err(BreadthError::Config(format!(
                "lookback_days must be at least 2 (got {})",
                self.lookback_days
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(BreadthError::Config("request_timeout_secs must be positive".into()));
        }
        if !(self.threshold > 0.0 && self.threshold <= 100.0) {
            return Err(BreadthError::Config(format!(
                "threshold must be in (0, 100] (got {})",
                self.threshold
            )));
        }
        if self.chart_width == 0 || self.chart_height == 0 {
            return Err(BreadthError::Config("chart dimensions must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn chart_style(&self) -> ChartStyle {
        ChartStyle {
            width: self.chart_width,
            height: self.chart_height,
            threshold: self.threshold,
        }
    }
}
