use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, info};

use crate::case::*;
use crate::error::TopologyError;
use crate::evaluate::Session;
use crate::oracle::PowerFlowOracle;

/// Ranking order of isolating candidates: least interrupted load, then
/// fewest de-energized buses, then switch id.
pub fn compare_candidates(a: &IsolationResult, b: &IsolationResult) -> Ordering {
    a.interrupted_kw
        .total_cmp(&b.interrupted_kw)
        .then_with(|| a.isolated_buses.len().cmp(&b.isolated_buses.len()))
        .then_with(|| a.switch_id.cmp(&b.switch_id))
}

/// Best candidate among those that isolate the span. Failed solves and
/// non-isolating candidates never win.
pub fn rank(results: impl IntoIterator<Item = IsolationResult>) -> Option<IsolationResult> {
    results
        .into_iter()
        .filter(|r| r.isolates_span && !r.is_failed())
        .min_by(compare_candidates)
}

impl<O: PowerFlowOracle> Session<O> {
    /// Exhaustive scan of `candidates` against `span`.
    ///
    /// Returns `Ok(None)` when no candidate isolates the span. Every
    /// candidate must be an NF switch; an NA tie fails with
    /// [`TopologyError::NormallyOpen`].
    pub fn best_switch(
        &mut self,
        span: &Span,
        candidates: &[String],
    ) -> Result<Option<IsolationResult>, TopologyError> {
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            results.push(self.evaluate(candidate, span)?);
        }
        info!("Span {}: evaluated {} candidate switches", span, results.len());
        let winner = rank(results);
        match &winner {
            Some(best) => info!(
                "Span {}: open {} ({:.3} kW, {} buses)",
                span,
                best.switch_id,
                best.interrupted_kw,
                best.isolated_count()
            ),
            None => info!("Span {}: no single switch isolates it", span),
        }
        Ok(winner)
    }

    /// Winner for `span` over the engine's candidate set.
    pub fn best_switch_for_span(&mut self, span: &Span) -> Result<SpanOutcome, TopologyError> {
        let candidates = self.engine().candidates().to_vec();
        Ok(match self.best_switch(span, &candidates)? {
            Some(result) => SpanOutcome::Isolated(result),
            None => SpanOutcome::NoneIsolates,
        })
    }

    /// Effect of each candidate switch opened on its own.
    pub fn map_all_switches(&mut self) -> Result<BTreeMap<String, IsolationResult>, TopologyError> {
        let candidates = self.engine().candidates().to_vec();
        let mut map = BTreeMap::new();
        for candidate in &candidates {
            let result = self.evaluate_switch(candidate)?;
            debug!("{}", result);
            map.insert(result.switch_id.clone(), result);
        }
        info!("Switch map: evaluated {} candidate switches", map.len());
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::tests::{StubbornOracle, engine};
    use crate::fixtures::approx;
    use std::collections::BTreeSet;

    fn result(id: &str, kw: f64, buses: &[&str], isolates: bool) -> IsolationResult {
        IsolationResult {
            switch_id: id.to_string(),
            isolated_buses: buses.iter().map(|b| BusId::new(b)).collect(),
            interrupted_kw: kw,
            isolates_span: isolates,
            solver_error: None,
        }
    }

    #[test]
    fn picks_least_interrupted_load() {
        let mut session = engine().connectivity_session();
        let outcome = session.best_switch_for_span(&Span::buses("B12", "B13")).unwrap();
        let best = outcome.winner().expect("a switch isolates b12-b13");
        assert_eq!(best.switch_id, "sw3");
        assert!(approx(best.interrupted_kw, 45.2));
        let names: Vec<&str> = best.isolated_buses.iter().map(BusId::as_str).collect();
        assert_eq!(names, vec!["b12", "b13", "b14"]);
    }

    #[test]
    fn upstream_switch_also_isolates_but_costs_more() {
        let mut session = engine().connectivity_session();
        let sw5 = session.evaluate("sw5", &Span::buses("b12", "b13")).unwrap();
        assert!(sw5.isolates_span);
        assert!(approx(sw5.interrupted_kw, 60.0));
        assert_eq!(sw5.isolated_count(), 11);
    }

    #[test]
    fn no_isolating_switch_is_reported_not_an_error() {
        let mut session = engine().connectivity_session();
        // sw1 drops b3, sw2 drops b30; nothing drops both
        let outcome = session.best_switch_for_span(&Span::buses("b3", "b30")).unwrap();
        assert_eq!(outcome, SpanOutcome::NoneIsolates);

        // the feeder head line is upstream of every switch
        let outcome = session.best_switch_for_span(&Span::line("l0")).unwrap();
        assert_eq!(outcome, SpanOutcome::NoneIsolates);
    }

    #[test]
    fn repeated_scans_agree() {
        let mut session = engine().connectivity_session();
        let span = Span::line("l13");
        let first = session.best_switch_for_span(&span).unwrap();
        for _ in 0..3 {
            assert_eq!(session.best_switch_for_span(&span).unwrap(), first);
        }
    }

    #[test]
    fn candidate_order_does_not_matter() {
        let mut session = engine().connectivity_session();
        let span = Span::line("l12");
        let mut candidates = session.engine().candidates().to_vec();
        let forward = session.best_switch(&span, &candidates).unwrap();
        candidates.reverse();
        let backward = session.best_switch(&span, &candidates).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn fewer_isolated_buses_break_a_load_tie() {
        let winner = rank(vec![
            result("sw1", 30.0, &["a", "b", "c"], true),
            result("sw2", 30.0, &["a", "b"], true),
        ])
        .unwrap();
        assert_eq!(winner.switch_id, "sw2");
    }

    #[test]
    fn switch_id_breaks_a_full_tie() {
        let winner = rank(vec![
            result("sw9", 30.0, &["a", "b"], true),
            result("sw4", 30.0, &["c", "d"], true),
        ])
        .unwrap();
        assert_eq!(winner.switch_id, "sw4");
    }

    #[test]
    fn non_isolating_and_failed_results_never_win() {
        let mut failed = IsolationResult::failed("sw0", "diverged".to_string());
        failed.isolates_span = true;
        let winner = rank(vec![
            failed,
            result("sw1", 0.0, &[], false),
            result("sw2", 99.0, &["a", "b"], true),
        ])
        .unwrap();
        assert_eq!(winner.switch_id, "sw2");
        assert!(rank(Vec::new()).is_none());
    }

    #[test]
    fn failed_candidate_is_skipped_and_scan_continues() {
        let engine = engine();
        let mut session = engine.session(StubbornOracle::new(&engine, "sw3"));
        let outcome = session.best_switch_for_span(&Span::line("l12")).unwrap();
        let best = outcome.winner().unwrap();
        assert_eq!(best.switch_id, "sw5");
        assert!(approx(best.interrupted_kw, 60.0));
    }

    #[test]
    fn map_covers_every_candidate() {
        let mut session = engine().connectivity_session();
        let map = session.map_all_switches().unwrap();
        let ids: BTreeSet<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            ids,
            ["sw1", "sw2", "sw3", "sw4", "sw5", "sw6"].into_iter().collect()
        );
        assert!(map.values().all(|r| !r.isolates_span));
        assert_eq!(map["sw6"].isolated_count(), 1);
        assert!(approx(map["sw1"].interrupted_kw, 22.0));
    }

    #[test]
    fn unknown_span_surfaces_as_error() {
        let mut session = engine().connectivity_session();
        assert!(matches!(
            session.best_switch_for_span(&Span::line("nope")),
            Err(TopologyError::UnknownSpan(_))
        ));
    }

    #[test]
    fn caller_supplied_na_candidate_is_rejected() {
        let mut session = engine().connectivity_session();
        let candidates = vec!["sw3".to_string(), "sw7".to_string()];
        assert_eq!(
            session.best_switch(&Span::line("l12"), &candidates),
            Err(TopologyError::NormallyOpen("sw7".to_string()))
        );
    }
}
