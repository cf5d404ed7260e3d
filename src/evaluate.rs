use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::case::*;
use crate::config::EngineConfig;
use crate::error::{Result, SolverError, TopologyError};
use crate::load::LoadModel;
use crate::oracle::{ConnectivityOracle, PowerFlowOracle};
use crate::parse::read_feeder;
use crate::topology::Topology;

/// Read-only inputs of an evaluation session: topology, loads, and the
/// resolved candidate set.
#[derive(Debug, Clone)]
pub struct Engine {
    topology: Arc<Topology>,
    loads: Arc<LoadModel>,
    candidates: Vec<String>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(topology: Topology, loads: LoadModel, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let candidates = match &config.candidates {
            Some(list) => {
                let mut resolved = Vec::with_capacity(list.len());
                for id in list {
                    let line = topology.switch(id)?;
                    if line.kind == LineKind::Na {
                        return Err(TopologyError::NormallyOpen(line.name.clone()).into());
                    }
                    resolved.push(line.name.clone());
                }
                resolved
            }
            None => topology.nf_switches().map(|l| l.name.clone()).collect(),
        };
        if candidates.is_empty() {
            warn!("No candidate switches; every span query will report no isolating switch");
        }

        let orphans: Vec<&BusId> = loads.buses().filter(|b| !topology.contains_bus(b)).collect();
        if !orphans.is_empty() {
            warn!("{} load buses are not in the topology", orphans.len());
            debug!("Orphan load buses: {:?}", orphans);
        }

        Ok(Self {
            topology: Arc::new(topology),
            loads: Arc::new(loads),
            candidates,
            config,
        })
    }

    /// Reads topology (and optionally a separate loads file) from disk.
    /// Missing or malformed files are fatal.
    pub fn from_files(feeder: &Path, loads: Option<&Path>, config: EngineConfig) -> Result<Self> {
        let mut records = read_feeder(feeder, "topology", &config)?;
        if let Some(path) = loads {
            records.merge(read_feeder(path, "load", &config)?)?;
        }
        let topology = Topology::build(records.source_or_default(), records.lines)?;
        let loads = LoadModel::from_entries(records.loads);
        Self::new(topology, loads, config)
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn loads(&self) -> &LoadModel {
        &self.loads
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Session that exclusively owns `oracle`.
    pub fn session<O: PowerFlowOracle>(&self, oracle: O) -> Session<O> {
        Session {
            engine: self.clone(),
            oracle,
            phase: EvaluationPhase::Idle,
        }
    }

    /// Session backed by a fresh [`ConnectivityOracle`].
    pub fn connectivity_session(&self) -> Session<ConnectivityOracle> {
        let oracle =
            ConnectivityOracle::new(Arc::clone(&self.topology), self.config.source_voltage);
        self.session(oracle)
    }
}

/// Lifecycle of one candidate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPhase {
    Idle,
    ConfigurationApplied,
    Solved,
    IsolationDetermined,
    SolverFailed,
}

impl fmt::Display for EvaluationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvaluationPhase::Idle => "idle",
            EvaluationPhase::ConfigurationApplied => "configuration-applied",
            EvaluationPhase::Solved => "solved",
            EvaluationPhase::IsolationDetermined => "isolation-determined",
            EvaluationPhase::SolverFailed => "solver-failed",
        };
        f.write_str(name)
    }
}

/// One evaluation session: engine inputs plus an exclusively owned oracle.
pub struct Session<O: PowerFlowOracle> {
    engine: Engine,
    oracle: O,
    phase: EvaluationPhase,
}

impl<O: PowerFlowOracle> Session<O> {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn topology(&self) -> &Topology {
        &self.engine.topology
    }

    pub fn phase(&self) -> EvaluationPhase {
        self.phase
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }

    fn advance(&mut self, next: EvaluationPhase) {
        trace!("evaluation {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Effect of opening `candidate` on `span`.
    pub fn evaluate(
        &mut self,
        candidate: &str,
        span: &Span,
    ) -> std::result::Result<IsolationResult, TopologyError> {
        let endpoints = self.topology().span_endpoints(span)?;
        let switch_id = self.checked_switch(candidate)?;
        Ok(self.run(&switch_id, Some(&endpoints)))
    }

    /// Effect of opening `candidate` with no span in mind.
    pub fn evaluate_switch(
        &mut self,
        candidate: &str,
    ) -> std::result::Result<IsolationResult, TopologyError> {
        let switch_id = self.checked_switch(candidate)?;
        Ok(self.run(&switch_id, None))
    }

    /// Energized buses of the untouched baseline.
    pub fn baseline_energization(
        &mut self,
    ) -> std::result::Result<BTreeSet<BusId>, SolverError> {
        self.oracle.reset_to_baseline();
        self.oracle.solve()?;
        let threshold = self.engine.config.deenergized_threshold;
        Ok(self
            .oracle
            .bus_names()
            .into_iter()
            .filter(|b| self.oracle.energization(b) >= threshold)
            .collect())
    }

    /// Candidates must be NF switches; an NA tie is already open.
    fn checked_switch(&self, candidate: &str) -> std::result::Result<String, TopologyError> {
        let line = self.topology().switch(candidate)?;
        if line.kind == LineKind::Na {
            return Err(TopologyError::NormallyOpen(line.name.clone()));
        }
        Ok(line.name.clone())
    }

    fn run(&mut self, switch_id: &str, span: Option<&(BusId, BusId)>) -> IsolationResult {
        // always start from the nominal circuit
        self.oracle.reset_to_baseline();
        let config = self.topology().baseline().with_open(switch_id);
        if let Err(e) = self.oracle.apply_configuration(&config) {
            return self.fail(switch_id, e);
        }
        self.advance(EvaluationPhase::ConfigurationApplied);

        if let Err(e) = self.oracle.solve() {
            return self.fail(switch_id, e);
        }
        self.advance(EvaluationPhase::Solved);

        let threshold = self.engine.config.deenergized_threshold;
        let isolated_buses: BTreeSet<BusId> = self
            .oracle
            .bus_names()
            .into_iter()
            .filter(|b| self.oracle.energization(b) < threshold)
            .collect();
        let isolates_span =
            span.is_some_and(|(u, v)| isolated_buses.contains(u) && isolated_buses.contains(v));
        let interrupted_kw = self.engine.loads.kw_over(&isolated_buses);
        self.advance(EvaluationPhase::IsolationDetermined);

        let result = IsolationResult {
            switch_id: switch_id.to_string(),
            isolated_buses,
            interrupted_kw,
            isolates_span,
            solver_error: None,
        };
        debug!("{}", result);
        self.advance(EvaluationPhase::Idle);
        result
    }

    fn fail(&mut self, switch_id: &str, error: SolverError) -> IsolationResult {
        self.advance(EvaluationPhase::SolverFailed);
        warn!("Candidate {} excluded: {}", switch_id, error);
        self.advance(EvaluationPhase::Idle);
        IsolationResult::failed(switch_id, error.to_string())
    }
}
