use std::collections::HashMap;

use log::{debug, info, warn};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

use crate::case::*;
use crate::error::TopologyError;

/// Bus/line graph of one feeder.
///
/// Nodes are buses, edges carry the index of their [`Line`] in declaration
/// order. The graph holds every line including NA ties; whether a line
/// conducts is decided by the switch configuration, not by the graph.
#[derive(Debug, Clone)]
pub struct Topology {
    graph: UnGraph<BusId, usize>,
    bus_index: HashMap<BusId, NodeIndex>,
    lines: Vec<Line>,
    line_index: HashMap<String, usize>,
    source: BusId,
}

impl Topology {
    /// Builds the graph and checks that the nominal network is radial.
    ///
    /// Duplicate line names keep the first definition.
    pub fn build(
        source: BusId,
        records: impl IntoIterator<Item = Line>,
    ) -> Result<Self, TopologyError> {
        let mut topology = Topology {
            graph: UnGraph::new_undirected(),
            bus_index: HashMap::new(),
            lines: Vec::new(),
            line_index: HashMap::new(),
            source,
        };

        for line in records {
            if topology.line_index.contains_key(&line.name) {
                warn!("Duplicate definition of {} ignored", line.name);
                continue;
            }
            let a = topology.node(&line.from_bus);
            let b = topology.node(&line.to_bus);
            let idx = topology.lines.len();
            topology.graph.add_edge(a, b, idx);
            topology.line_index.insert(line.name.clone(), idx);
            topology.lines.push(line);
        }

        if topology.lines.is_empty() {
            return Err(TopologyError::Empty);
        }
        if !topology.bus_index.contains_key(&topology.source) {
            return Err(TopologyError::MissingSource(topology.source.to_string()));
        }
        topology.validate_radial()?;

        info!(
            "Topology: {} buses, {} lines, {} NF, {} NA, source {}",
            topology.bus_index.len(),
            topology.lines.len(),
            topology.nf_switches().count(),
            topology.na_switches().count(),
            topology.source,
        );
        Ok(topology)
    }

    fn node(&mut self, bus: &BusId) -> NodeIndex {
        if let Some(&idx) = self.bus_index.get(bus) {
            return idx;
        }
        let idx = self.graph.add_node(bus.clone());
        self.bus_index.insert(bus.clone(), idx);
        idx
    }

    /// Checks that the lines closed in the nominal state form a single tree
    /// hanging off the source bus.
    pub fn validate_radial(&self) -> Result<(), TopologyError> {
        let mut sets = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            let line = &self.lines[*edge.weight()];
            if line.kind.nominal_state() == SwitchState::Open {
                continue;
            }
            if !sets.union(edge.source().index(), edge.target().index()) {
                return Err(TopologyError::NotRadial {
                    line: line.name.clone(),
                    from: line.from_bus.to_string(),
                    to: line.to_bus.to_string(),
                });
            }
        }

        let source = self
            .bus_index
            .get(&self.source)
            .ok_or_else(|| TopologyError::MissingSource(self.source.to_string()))?;
        let mut unfed: Vec<String> = self
            .graph
            .node_indices()
            .filter(|n| !sets.equiv(source.index(), n.index()))
            .map(|n| self.graph[n].to_string())
            .collect();
        if !unfed.is_empty() {
            unfed.sort();
            return Err(TopologyError::Unfed {
                root: self.source.to_string(),
                buses: unfed,
            });
        }
        Ok(())
    }

    pub fn source(&self) -> &BusId {
        &self.source
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, name: &str) -> Option<&Line> {
        self.line_index
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.lines[idx])
    }

    /// Every NF and NA switch, in declaration order.
    pub fn switches(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter().filter(|l| l.kind.is_switch())
    }

    pub fn nf_switches(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter().filter(|l| l.kind == LineKind::Nf)
    }

    pub fn na_switches(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter().filter(|l| l.kind == LineKind::Na)
    }

    pub fn buses(&self) -> impl Iterator<Item = &BusId> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    pub fn bus_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains_bus(&self, bus: &BusId) -> bool {
        self.bus_index.contains_key(bus)
    }

    /// Neighbouring buses of `bus` together with the line reaching them.
    pub fn neighbors<'a>(
        &'a self,
        bus: &BusId,
    ) -> impl Iterator<Item = (&'a BusId, &'a Line)> + use<'a> {
        let node = self.bus_index.get(bus).copied();
        node.into_iter().flat_map(move |n| {
            self.graph.edges(n).map(move |edge| {
                let other = if edge.source() == n {
                    edge.target()
                } else {
                    edge.source()
                };
                (&self.graph[other], &self.lines[*edge.weight()])
            })
        })
    }

    /// Switch lookup. Fails for unknown names and for non-switch lines.
    pub fn switch(&self, switch_id: &str) -> Result<&Line, TopologyError> {
        let line = self
            .line(switch_id)
            .ok_or_else(|| TopologyError::UnknownSwitch(switch_id.to_string()))?;
        if !line.kind.is_switch() {
            return Err(TopologyError::NotASwitch(line.name.clone()));
        }
        Ok(line)
    }

    pub fn endpoints(&self, switch_id: &str) -> Result<(&BusId, &BusId), TopologyError> {
        let line = self.switch(switch_id)?;
        Ok((&line.from_bus, &line.to_bus))
    }

    /// Endpoint buses of a span, validated against the graph.
    pub fn span_endpoints(&self, span: &Span) -> Result<(BusId, BusId), TopologyError> {
        match span {
            Span::Line(name) => self
                .line(name)
                .map(|l| (l.from_bus.clone(), l.to_bus.clone()))
                .ok_or_else(|| TopologyError::UnknownSpan(name.clone())),
            Span::Buses(u, v) => {
                for bus in [u, v] {
                    if !self.contains_bus(bus) {
                        return Err(TopologyError::UnknownSpan(format!(
                            "{span} (bus {bus} not found)"
                        )));
                    }
                }
                if !self.neighbors(u).any(|(other, _)| other == v) {
                    debug!("Span {} joins buses that share no line", span);
                }
                Ok((u.clone(), v.clone()))
            }
        }
    }

    /// Nominal switch state: every NF closed, every NA open.
    pub fn baseline(&self) -> SwitchConfiguration {
        let mut config = SwitchConfiguration::new();
        for sw in self.switches() {
            config.set(&sw.name, sw.kind.nominal_state());
        }
        config
    }
}
