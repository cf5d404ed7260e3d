use std::collections::HashMap;

use log::debug;

use crate::case::{BusId, LoadEntry};

/// Per-bus aggregated demand in kW.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadModel {
    demand: HashMap<BusId, f64>,
}

impl LoadModel {
    /// Sums entries per bus.
    ///
    /// Contributions are added in (bus, kW) order, so the totals do not
    /// depend on the order of the input records.
    pub fn from_entries(entries: impl IntoIterator<Item = LoadEntry>) -> Self {
        let mut contributions: Vec<(BusId, f64)> =
            entries.into_iter().map(|e| (e.bus, e.kw)).collect();
        contributions.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut demand: HashMap<BusId, f64> = HashMap::new();
        for (bus, kw) in contributions {
            *demand.entry(bus).or_insert(0.0) += kw;
        }
        debug!("Load model: {} buses with demand", demand.len());
        Self { demand }
    }

    /// Demand at `bus`; buses without load records carry 0 kW.
    pub fn kw(&self, bus: &BusId) -> f64 {
        self.demand.get(bus).copied().unwrap_or(0.0)
    }

    /// Total demand over a set of buses. Each bus is counted once per
    /// occurrence in `buses`, so pass a set.
    pub fn kw_over<'a>(&self, buses: impl IntoIterator<Item = &'a BusId>) -> f64 {
        buses.into_iter().map(|b| self.kw(b)).sum()
    }

    pub fn total_kw(&self) -> f64 {
        let mut buses: Vec<&BusId> = self.demand.keys().collect();
        buses.sort();
        self.kw_over(buses)
    }

    pub fn buses(&self) -> impl Iterator<Item = &BusId> {
        self.demand.keys()
    }

    pub fn len(&self) -> usize {
        self.demand.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demand.is_empty()
    }
}
