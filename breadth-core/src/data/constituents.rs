//! Index constituent resolution.
//!
//! The S&P 500 membership list is read fresh on every run from a CSV table
//! with a `Symbol` column. A fixed list can be supplied instead, which is how
//! tests and `--symbols` overrides bypass the network.

use crate::error::BreadthError;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Public S&P 500 constituents table maintained by the datasets project.
pub const DEFAULT_CONSTITUENTS_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

/// Anything that can produce the raw membership list.
pub trait ConstituentSource {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Raw symbols as the source spells them.
    fn symbols(&self) -> Result<Vec<String>, BreadthError>;
}

/// A fixed symbol list.
#[derive(Debug, Clone)]
pub struct StaticSource {
    symbols: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConstituentSource for StaticSource {
    fn name(&self) -> &str {
        "static list"
    }

    fn symbols(&self) -> Result<Vec<String>, BreadthError> {
        Ok(self.symbols.clone())
    }
}

/// Constituents table downloaded over HTTP.
pub struct RemoteCsvSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl RemoteCsvSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BreadthError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BreadthError::Resolution(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ConstituentSource for RemoteCsvSource {
    fn name(&self) -> &str {
        &self.url
    }

    fn symbols(&self) -> Result<Vec<String>, BreadthError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| BreadthError::Resolution(format!("GET {}: {e}", self.url)))?;
        parse_constituent_csv(resp)
    }
}

/// Constituents table on local disk.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
    label: String,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConstituentSource for CsvFileSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn symbols(&self) -> Result<Vec<String>, BreadthError> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| BreadthError::Resolution(format!("open {}: {e}", self.label)))?;
        parse_constituent_csv(file)
    }
}

/// Read the `Symbol` column (case-insensitive header match) of a CSV table.
pub fn parse_constituent_csv<R: Read>(reader: R) -> Result<Vec<String>, BreadthError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| BreadthError::Resolution(format!("read constituents header: {e}")))?;
    let col = headers
        .iter()
        .position(|h| {
            let h = h.trim();
            h.eq_ignore_ascii_case("symbol") || h.eq_ignore_ascii_case("ticker")
        })
        .ok_or_else(|| BreadthError::Resolution("constituents table has no Symbol column".into()))?;

    let mut symbols = Vec::new();
    for record in rdr.records() {
        let record = record
            .map_err(|e| BreadthError::Resolution(format!("read constituents row: {e}")))?;
        if let Some(sym) = record.get(col) {
            symbols.push(sym.to_string());
        }
    }
    Ok(symbols)
}

/// Convert a listing symbol to the provider's spelling.
///
/// Share classes use a dash on Yahoo (`BRK.B` becomes `BRK-B`). Blank entries
/// yield `None`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let sym = raw.trim();
    if sym.is_empty() {
        return None;
    }
    Some(sym.to_ascii_uppercase().replace('.', "-"))
}

/// Resolve the run's constituent set: normalized, de-duplicated, non-empty.
///
/// First-seen order is kept so fetch logs follow the source table.
pub fn resolve_constituents(source: &dyn ConstituentSource) -> Result<Vec<String>, BreadthError> {
    let raw = source.symbols()?;

    let mut seen = HashSet::new();
    let symbols: Vec<String> = raw
        .iter()
        .filter_map(|s| normalize_symbol(s))
        .filter(|s| seen.insert(s.clone()))
        .collect();

    if symbols.is_empty() {
        return Err(BreadthError::Resolution(format!(
            "{} returned no symbols",
            source.name()
        )));
    }

    tracing::info!(count = symbols.len(), source = source.name(), "resolved constituents");
    Ok(symbols)
}
