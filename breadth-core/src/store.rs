//! Persisted breadth history.
//!
//! Layout: one CSV file, `date,pct_declining,pct_volume_declining`, one row per
//! trading date, ascending. The file is read and written wholesale.
//!
//! - Atomic writes (write to `.tmp`, fsync, rename into place)
//! - A missing file is an empty history
//! - Load validation: no duplicate dates, ratios within [0, 100]

use crate::breadth::BreadthRecord;
use crate::error::BreadthError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Date-keyed breadth history. Dates are unique and iterate ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreadthSeries {
    records: BTreeMap<NaiveDate, BreadthRecord>,
}

impl BreadthSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, replacing any record with the same date.
    ///
    /// Returns the replaced record, if there was one.
    pub fn upsert(&mut self, record: BreadthRecord) -> Option<BreadthRecord> {
        self.records.insert(record.date, record)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&BreadthRecord> {
        self.records.get(&date)
    }

    /// Records in ascending date order.
    pub fn records(&self) -> impl Iterator<Item = &BreadthRecord> + '_ {
        self.records.values()
    }

    pub fn first(&self) -> Option<&BreadthRecord> {
        self.records.values().next()
    }

    pub fn last(&self) -> Option<&BreadthRecord> {
        self.records.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<BreadthRecord> for BreadthSeries {
    fn from_iter<I: IntoIterator<Item = BreadthRecord>>(iter: I) -> Self {
        let mut series = Self::new();
        for record in iter {
            series.upsert(record);
        }
        series
    }
}

/// On-disk row.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    date: NaiveDate,
    pct_declining: f64,
    pct_volume_declining: f64,
}

impl From<&BreadthRecord> for Row {
    fn from(r: &BreadthRecord) -> Self {
        Self {
            date: r.date,
            pct_declining: r.pct_declining,
            pct_volume_declining: r.pct_volume_declining,
        }
    }
}

impl From<Row> for BreadthRecord {
    fn from(row: Row) -> Self {
        Self {
            date: row.date,
            pct_declining: row.pct_declining,
            pct_volume_declining: row.pct_volume_declining,
        }
    }
}

/// CSV-backed store for the breadth history. Assumes a single writer.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    path: PathBuf,
}

impl SeriesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the full history. A missing file yields an empty series.
    pub fn load(&self) -> Result<BreadthSeries, BreadthError> {
        if !self.path.exists() {
            return Ok(BreadthSeries::new());
        }

        let mut rdr = csv::Reader::from_path(&self.path)
            .map_err(|e| BreadthError::Store(format!("open {}: {e}", self.path.display())))?;

        let mut series = BreadthSeries::new();
        for (i, row) in rdr.deserialize::<Row>().enumerate() {
            // header is line 1
            let line = i + 2;
            let row = row.map_err(|e| {
                BreadthError::Store(format!("{} line {line}: {e}", self.path.display()))
            })?;
            let record = BreadthRecord::from(row);
            if !record.is_valid() {
                return Err(BreadthError::Store(format!(
                    "{} line {line}: ratios out of range for {}",
                    self.path.display(),
                    record.date
                )));
            }
            if series.upsert(record).is_some() {
                return Err(BreadthError::Store(format!(
                    "{} line {line}: duplicate date {}",
                    self.path.display(),
                    record.date
                )));
            }
        }

        Ok(series)
    }

    /// Replace the persisted history with `series`.
    ///
    /// The file is written to a `.tmp` sibling and renamed into place, so a
    /// crash leaves either the old or the new file, never a partial one.
    pub fn save(&self, series: &BreadthSeries) -> Result<(), BreadthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BreadthError::Store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let tmp_path = self.tmp_path();
        let result = write_csv(&tmp_path, series).and_then(|()| {
            fs::rename(&tmp_path, &self.path)
                .map_err(|e| BreadthError::Store(format!("atomic rename failed: {e}")))
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

fn write_csv(path: &Path, series: &BreadthSeries) -> Result<(), BreadthError> {
    let store_err = |e: &dyn std::fmt::Display| {
        BreadthError::Store(format!("write {}: {e}", path.display()))
    };

    let file = fs::File::create(path).map_err(|e| store_err(&e))?;
    let mut wtr = csv::Writer::from_writer(file);
    if series.is_empty() {
        wtr.write_record(["date", "pct_declining", "pct_volume_declining"])
            .map_err(|e| store_err(&e))?;
    }
    for record in series.records() {
        wtr.serialize(Row::from(record)).map_err(|e| store_err(&e))?;
    }
    let file = wtr.into_inner().map_err(|e| store_err(&e))?;
    file.sync_all().map_err(|e| store_err(&e))?;
    Ok(())
}
