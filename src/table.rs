use std::collections::HashMap;
use std::io;

use log::info;
use serde::{Deserialize, Serialize};

use crate::case::*;
use crate::error::{Error, TopologyError};
use crate::evaluate::Session;
use crate::oracle::PowerFlowOracle;
use crate::select::rank;

/// Precomputed winner for one span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRow {
    pub span: String,
    pub switch: Option<String>,
    pub isolated_bus_count: usize,
    pub interrupted_kw: f64,
}

/// Winners for every line of the topology, served without the oracle.
///
/// Rebuild with [`LookupTable::recompute`] whenever topology or loads change;
/// the table itself does not notice staleness.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    rows: Vec<LookupRow>,
    by_line: HashMap<String, usize>,
    by_buses: HashMap<(BusId, BusId), usize>,
}

impl LookupTable {
    /// Recomputes every span's winner.
    ///
    /// A candidate's isolated set does not depend on the span, so each
    /// candidate is simulated once and the span test is applied afterwards.
    pub fn recompute<O: PowerFlowOracle>(session: &mut Session<O>) -> Result<Self, TopologyError> {
        let effects = session.map_all_switches()?;
        let mut table = LookupTable::default();

        let spans: Vec<Line> = session.topology().lines().to_vec();
        for line in &spans {
            let (u, v) = (&line.from_bus, &line.to_bus);
            let winner = rank(effects.values().cloned().map(|mut r| {
                r.isolates_span =
                    !r.is_failed() && r.isolated_buses.contains(u) && r.isolated_buses.contains(v);
                r
            }));
            let row = match winner {
                Some(best) => LookupRow {
                    span: line.name.clone(),
                    switch: Some(best.switch_id.clone()),
                    isolated_bus_count: best.isolated_count(),
                    interrupted_kw: best.interrupted_kw,
                },
                None => LookupRow {
                    span: line.name.clone(),
                    switch: None,
                    isolated_bus_count: 0,
                    interrupted_kw: 0.0,
                },
            };
            table.insert(row, u.clone(), v.clone());
        }

        info!(
            "Lookup table: {} spans, {} isolable",
            table.rows.len(),
            table.rows.iter().filter(|r| r.switch.is_some()).count()
        );
        Ok(table)
    }

    fn insert(&mut self, row: LookupRow, u: BusId, v: BusId) {
        let idx = self.rows.len();
        self.by_line.insert(row.span.clone(), idx);
        self.by_buses.entry((u.clone(), v.clone())).or_insert(idx);
        self.by_buses.entry((v, u)).or_insert(idx);
        self.rows.push(row);
    }

    pub fn get(&self, span: &Span) -> Option<&LookupRow> {
        let idx = match span {
            Span::Line(name) => self.by_line.get(name),
            Span::Buses(u, v) => self.by_buses.get(&(u.clone(), v.clone())),
        };
        idx.map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[LookupRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Serializes the table as CSV. The header comes from the row field names;
/// a span without a winner leaves the switch column empty.
pub fn table_to_csv(table: &LookupTable) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in table.rows() {
        writer.serialize(row)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    Ok(text)
}
