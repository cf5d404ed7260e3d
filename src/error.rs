//! Error taxonomy for the isolation engine.
//!
//! Only [`DataError`] is fatal to a whole run. [`SolverError`] is recovered per
//! candidate by the evaluator, and [`TopologyError`] is surfaced to the caller
//! as a bad query. "No switch isolates this span" is not an error at all, see
//! [`crate::SpanOutcome::NoneIsolates`].

use std::path::PathBuf;
use thiserror::Error;

/// A span or switch the topology does not know, or a topology that cannot be
/// operated radially.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("span {0} not found")]
    UnknownSpan(String),

    #[error("switch {0} not found")]
    UnknownSwitch(String),

    #[error("line {0} is not a switch")]
    NotASwitch(String),

    #[error("switch {0} is normally open and cannot be a candidate")]
    NormallyOpen(String),

    #[error("source bus {0} is not connected to any line")]
    MissingSource(String),

    #[error("line {line} closes a loop between {from} and {to}; network is not radial")]
    NotRadial {
        line: String,
        from: String,
        to: String,
    },

    #[error("buses {buses:?} have no closed path to source {root}")]
    Unfed { root: String, buses: Vec<String> },

    #[error("topology has no lines")]
    Empty,
}

/// Failure of one oracle solve. Excludes the candidate, never aborts the scan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("solution did not converge: {0}")]
    NotConverged(String),

    #[error("switch {0} is unknown to the solver")]
    UnknownSwitch(String),
}

/// Malformed declaration in a feeder or load file.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Topology or load source unavailable or unusable.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("{kind} data missing at {path}: {source}")]
    Missing {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} data in {path} is malformed: {source}")]
    Malformed {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Top-level error for engine construction and front ends.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
