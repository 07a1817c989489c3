//! Run-level error taxonomy.
//!
//! Every variant of [`BreadthError`] aborts the run. Partial market data is not
//! an error: it travels in the run summary as a [`PartialDataWarning`].

use crate::data::provider::DataError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BreadthError {
    #[error("cannot resolve index constituents: {0}")]
    Resolution(String),

    #[error("no usable market data: {0}")]
    DataUnavailable(String),

    #[error("series store error: {0}")]
    Store(String),

    #[error("chart render error: {0}")]
    Render(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BreadthError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            BreadthError::Resolution(_) => 2,
            BreadthError::DataUnavailable(_) => 3,
            BreadthError::Store(_) => 4,
            BreadthError::Render(_) => 5,
            BreadthError::Config(_) => 1,
        }
    }
}

/// Symbols that returned no usable data. Non-fatal.
#[derive(Debug, Default)]
pub struct PartialDataWarning {
    pub requested: usize,
    pub failures: Vec<(String, DataError)>,
}

impl PartialDataWarning {
    pub fn failed_symbols(&self) -> Vec<&str> {
        self.failures.iter().map(|(s, _)| s.as_str()).collect()
    }
}

impl fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} symbols returned no usable data",
            self.failures.len(),
            self.requested
        )?;
        const SHOWN: usize = 10;
        let names = self.failed_symbols();
        if !names.is_empty() {
            write!(f, ": {}", names[..names.len().min(SHOWN)].join(", "))?;
            if names.len() > SHOWN {
                write!(f, ", ... ({} more)", names.len() - SHOWN)?;
            }
        }
        Ok(())
    }
}
