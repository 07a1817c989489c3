//! Breadth Core — daily S&P 500 market breadth.
//!
//! Pipeline, in dependency order:
//! - Constituent resolution (`data::constituents`)
//! - Daily bar fetch with timeout, bounded retry and circuit breaker (`data::fetch`)
//! - Breadth ratios: % of constituents declining, % of volume in decliners (`breadth`)
//! - Date-keyed CSV history with atomic replace (`store`)
//! - PNG chart with the capitulation threshold (`chart`)
//!
//! `pipeline::run` executes one update end to end.

pub mod breadth;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod store;

pub use breadth::{BreadthRecord, BreadthReport, BreadthStats};
pub use config::Config;
pub use error::{BreadthError, PartialDataWarning};
pub use pipeline::{run, RunContext, RunSummary};
pub use store::{BreadthSeries, SeriesStore};
