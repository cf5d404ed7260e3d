//! Switch isolation engine for radial distribution feeders.
//!
//! Given a span scheduled for maintenance, every normally-closed switch is
//! opened in turn on a [`PowerFlowOracle`], the buses left below the
//! de-energization threshold are collected, and the switch that isolates
//! both span endpoints while interrupting the least load wins.

pub mod case;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod load;
pub mod oracle;
pub mod parse;
pub mod select;
pub mod server;
pub mod table;
pub mod topology;

#[cfg(test)]
mod fixtures;

pub use case::{
    BusId, IsolationResult, Line, LineKind, LoadEntry, Span, SpanOutcome, SwitchConfiguration,
    SwitchState,
};
pub use config::{EngineConfig, ServerConfig};
pub use error::{DataError, Error, ParseError, Result, SolverError, TopologyError};
pub use evaluate::{Engine, EvaluationPhase, Session};
pub use load::LoadModel;
pub use oracle::{ConnectivityOracle, PowerFlowOracle};
pub use parse::{FeederRecords, parse_feeder_str, read_feeder};
pub use select::{compare_candidates, rank};
pub use table::{LookupRow, LookupTable, table_to_csv};
pub use topology::Topology;
