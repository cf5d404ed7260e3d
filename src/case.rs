use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Bus identifier, normalized on construction.
///
/// Phase/terminal qualifiers (`"632.1.2.3"`) are stripped at the first `.`
/// and the remainder is lower-cased, so `"B12.1"` and `"b12"` name the same bus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BusId(String);

impl BusId {
    pub fn new(raw: &str) -> Self {
        let base = raw.split('.').next().unwrap_or(raw);
        Self(base.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BusId {
    fn from(raw: String) -> Self {
        BusId::new(&raw)
    }
}

impl From<&str> for BusId {
    fn from(raw: &str) -> Self {
        BusId::new(raw)
    }
}

impl From<BusId> for String {
    fn from(bus: BusId) -> Self {
        bus.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Fixed, // plain conductor or transformer, always closed
    Nf,    // normally closed, candidate for opening
    Na,    // normally open tie, excluded from the search
}

impl LineKind {
    pub fn is_switch(self) -> bool {
        self != LineKind::Fixed
    }

    /// State of the element in the nominal network.
    pub fn nominal_state(self) -> SwitchState {
        match self {
            LineKind::Na => SwitchState::Open,
            LineKind::Fixed | LineKind::Nf => SwitchState::Closed,
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::Fixed => write!(f, "fixed"),
            LineKind::Nf => write!(f, "NF"),
            LineKind::Na => write!(f, "NA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub kind: LineKind,
}

impl Line {
    pub fn new(name: &str, from_bus: &str, to_bus: &str, kind: LineKind) -> Self {
        Self {
            name: name.trim().to_ascii_lowercase(),
            from_bus: BusId::new(from_bus),
            to_bus: BusId::new(to_bus),
            kind,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line {:<10} {:>5}  {:>8} -> {:<8}",
            self.name, self.kind, self.from_bus, self.to_bus
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEntry {
    pub name: String,
    pub bus: BusId,
    pub kw: f64,
}

impl LoadEntry {
    pub fn new(name: &str, bus: &str, kw: f64) -> Self {
        Self {
            name: name.trim().to_ascii_lowercase(),
            bus: BusId::new(bus),
            kw,
        }
    }
}

impl fmt::Display for LoadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Load {:<12} Bus {:<8} P={:>9.3} kW", self.name, self.bus, self.kw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    Open,
    Closed,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::Open => write!(f, "open"),
            SwitchState::Closed => write!(f, "closed"),
        }
    }
}

/// Full switch state handed to the oracle for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchConfiguration {
    states: BTreeMap<String, SwitchState>,
}

impl SwitchConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, switch_id: &str, state: SwitchState) {
        self.states.insert(switch_id.to_string(), state);
    }

    /// Copy of this configuration with one extra switch forced open.
    pub fn with_open(&self, switch_id: &str) -> Self {
        let mut next = self.clone();
        next.set(switch_id, SwitchState::Open);
        next
    }

    pub fn state(&self, switch_id: &str) -> Option<SwitchState> {
        self.states.get(switch_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SwitchState)> {
        self.states.iter().map(|(id, state)| (id.as_str(), *state))
    }

    pub fn open_switches(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, state)| *state == SwitchState::Open)
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// A line segment nominated for maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Span {
    Line(String),
    Buses(BusId, BusId),
}

impl Span {
    pub fn line(name: &str) -> Self {
        Span::Line(name.trim().to_ascii_lowercase())
    }

    pub fn buses(u: &str, v: &str) -> Self {
        Span::Buses(BusId::new(u), BusId::new(v))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Span::Line(name) => f.write_str(name),
            Span::Buses(u, v) => write!(f, "{}-{}", u, v),
        }
    }
}

/// Effect of opening a single candidate switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationResult {
    pub switch_id: String,
    pub isolated_buses: BTreeSet<BusId>,
    pub interrupted_kw: f64,
    pub isolates_span: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub solver_error: Option<String>,
}

impl IsolationResult {
    /// Result for a candidate whose solve failed. Never isolates anything.
    pub fn failed(switch_id: &str, reason: String) -> Self {
        Self {
            switch_id: switch_id.to_string(),
            isolated_buses: BTreeSet::new(),
            interrupted_kw: 0.0,
            isolates_span: false,
            solver_error: Some(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.solver_error.is_some()
    }

    pub fn isolated_count(&self) -> usize {
        self.isolated_buses.len()
    }
}

impl fmt::Display for IsolationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.solver_error {
            return write!(f, "Switch {:<8} solve failed: {}", self.switch_id, reason);
        }
        write!(
            f,
            "Switch {:<8} isolated={:>4}  P={:>10.3} kW  span={}",
            self.switch_id,
            self.isolated_buses.len(),
            self.interrupted_kw,
            if self.isolates_span { "yes" } else { "no" }
        )
    }
}

/// Answer to a span query that named a known span.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanOutcome {
    Isolated(IsolationResult),
    NoneIsolates,
}

impl SpanOutcome {
    pub fn winner(&self) -> Option<&IsolationResult> {
        match self {
            SpanOutcome::Isolated(result) => Some(result),
            SpanOutcome::NoneIsolates => None,
        }
    }
}
