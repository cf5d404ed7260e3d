use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::{debug, trace};

use crate::case::*;
use crate::error::SolverError;
use crate::topology::Topology;

/// Circuit solver consulted once per candidate switch.
///
/// An implementation models ONE circuit instance whose state is mutated in
/// place, so every method that changes it takes `&mut self`. Callers drive
/// it strictly as reset -> apply -> solve -> query. Run parallel scans with
/// one oracle per worker.
pub trait PowerFlowOracle {
    /// Restore the nominal circuit: every NF closed, every NA open.
    fn reset_to_baseline(&mut self);

    fn open_switch(&mut self, switch_id: &str) -> Result<(), SolverError>;

    fn close_switch(&mut self, switch_id: &str) -> Result<(), SolverError>;

    /// Blocking solve of the current configuration.
    fn solve(&mut self) -> Result<(), SolverError>;

    /// Every bus the circuit reports on.
    fn bus_names(&self) -> Vec<BusId>;

    /// Energization magnitude of `bus` from the last successful solve.
    fn energization(&self, bus: &BusId) -> f64;

    fn apply_configuration(&mut self, config: &SwitchConfiguration) -> Result<(), SolverError> {
        for (switch_id, state) in config.iter() {
            match state {
                SwitchState::Open => self.open_switch(switch_id)?,
                SwitchState::Closed => self.close_switch(switch_id)?,
            }
        }
        Ok(())
    }
}

/// Reference oracle that decides energization by reachability.
///
/// A bus is energized at `source_voltage` when a path of closed branches
/// joins it to the source bus, and at 0 otherwise. No load-flow numerics
/// are performed; plug in a real solver behind [`PowerFlowOracle`] for that.
#[derive(Debug, Clone)]
pub struct ConnectivityOracle {
    topology: Arc<Topology>,
    source_voltage: f64,
    states: HashMap<String, SwitchState>,
    energized: Option<HashSet<BusId>>,
}

impl ConnectivityOracle {
    pub fn new(topology: Arc<Topology>, source_voltage: f64) -> Self {
        let mut oracle = Self {
            topology,
            source_voltage,
            states: HashMap::new(),
            energized: None,
        };
        oracle.reset_to_baseline();
        oracle
    }

    fn set_state(&mut self, switch_id: &str, state: SwitchState) -> Result<(), SolverError> {
        let name = switch_id.to_ascii_lowercase();
        if !self.states.contains_key(&name) {
            return Err(SolverError::UnknownSwitch(switch_id.to_string()));
        }
        trace!("{} -> {}", name, state);
        self.states.insert(name, state);
        self.energized = None;
        Ok(())
    }

    fn conducts(&self, line: &Line) -> bool {
        match line.kind {
            LineKind::Fixed => true,
            _ => self.states.get(&line.name) == Some(&SwitchState::Closed),
        }
    }
}

impl PowerFlowOracle for ConnectivityOracle {
    fn reset_to_baseline(&mut self) {
        self.states = self
            .topology
            .baseline()
            .iter()
            .map(|(id, state)| (id.to_string(), state))
            .collect();
        self.energized = None;
    }

    fn open_switch(&mut self, switch_id: &str) -> Result<(), SolverError> {
        self.set_state(switch_id, SwitchState::Open)
    }

    fn close_switch(&mut self, switch_id: &str) -> Result<(), SolverError> {
        self.set_state(switch_id, SwitchState::Closed)
    }

    fn solve(&mut self) -> Result<(), SolverError> {
        let topology = Arc::clone(&self.topology);
        let source = topology.source().clone();

        let mut energized: HashSet<BusId> = HashSet::new();
        let mut queue = VecDeque::new();
        energized.insert(source.clone());
        queue.push_back(source);

        while let Some(bus) = queue.pop_front() {
            for (next, line) in topology.neighbors(&bus) {
                if self.conducts(line) && energized.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }

        debug!(
            "Solved: {}/{} buses energized",
            energized.len(),
            topology.bus_count()
        );
        self.energized = Some(energized);
        Ok(())
    }

    fn bus_names(&self) -> Vec<BusId> {
        self.topology.buses().cloned().collect()
    }

    fn energization(&self, bus: &BusId) -> f64 {
        match &self.energized {
            Some(set) if set.contains(bus) => self.source_voltage,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn oracle() -> ConnectivityOracle {
        ConnectivityOracle::new(Arc::new(fixtures::topology()), 2401.8)
    }

    fn dead(oracle: &ConnectivityOracle) -> Vec<String> {
        let mut names: Vec<String> = oracle
            .bus_names()
            .into_iter()
            .filter(|b| oracle.energization(b) < 1.0)
            .map(String::from)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn baseline_energizes_every_bus() {
        let mut oracle = oracle();
        oracle.solve().unwrap();
        assert!(dead(&oracle).is_empty());
        assert_eq!(oracle.energization(&BusId::new("b27")), 2401.8);
    }

    #[test]
    fn opening_a_switch_drops_its_downstream_buses() {
        let mut oracle = oracle();
        oracle.open_switch("sw3").unwrap();
        oracle.solve().unwrap();
        assert_eq!(dead(&oracle), vec!["b12", "b13", "b14"]);
    }

    #[test]
    fn closing_a_tie_restores_through_the_alternate_path() {
        let mut oracle = oracle();
        oracle.open_switch("sw3").unwrap();
        oracle.close_switch("sw8").unwrap();
        oracle.solve().unwrap();
        assert!(dead(&oracle).is_empty());
    }

    #[test]
    fn nothing_is_energized_before_solve() {
        let mut oracle = oracle();
        oracle.solve().unwrap();
        oracle.open_switch("sw1").unwrap();
        assert_eq!(oracle.energization(&BusId::new("sourcebus")), 0.0);
    }

    #[test]
    fn reset_restores_baseline_energization() {
        let mut oracle = oracle();
        oracle.solve().unwrap();
        let before = dead(&oracle);

        oracle.open_switch("sw5").unwrap();
        oracle.solve().unwrap();
        assert_eq!(dead(&oracle).len(), 11);

        oracle.reset_to_baseline();
        oracle.solve().unwrap();
        assert_eq!(dead(&oracle), before);
    }

    #[test]
    fn unknown_or_fixed_switch_is_rejected() {
        let mut oracle = oracle();
        assert_eq!(
            oracle.open_switch("sw99"),
            Err(SolverError::UnknownSwitch("sw99".to_string()))
        );
        assert!(oracle.open_switch("l12").is_err());
    }

    #[test]
    fn apply_configuration_sets_every_listed_switch() {
        let topology = Arc::new(fixtures::topology());
        let mut oracle = ConnectivityOracle::new(Arc::clone(&topology), 2401.8);
        oracle
            .apply_configuration(&topology.baseline().with_open("sw2"))
            .unwrap();
        oracle.solve().unwrap();
        assert_eq!(dead(&oracle), vec!["b30", "b50"]);
    }
}
