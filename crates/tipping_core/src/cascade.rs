//! Cascade triggering and cataloguing.
//!
//! [`trigger_cascade`] pushes one node's control parameter upward in small
//! increments, re-equilibrating after each, until that node tips.
//! [`trigger_cascade_group`] does the same for several nodes at once. The
//! cascade size is the number of non-trigger nodes whose tip state changed.

use crate::error::{invalid, Result, TippingError};
use crate::evolve::{EquilibrateSettings, Evolver};
use crate::network::NetworkSpec;
use crate::trajectory::Trajectory;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeSettings {
    pub tolerance: f64,
    pub step: f64,
    /// Control added to the trigger node per ratchet step.
    pub increment: f64,
    pub max_increments: usize,
    /// Wall-clock budget for each equilibration.
    pub time_budget: Option<Duration>,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.005,
            step: 0.1,
            increment: 0.001,
            max_increments: 10_000,
            time_budget: Some(Duration::from_secs(30)),
        }
    }
}

impl CascadeSettings {
    pub fn validate(&self) -> Result<()> {
        self.equilibrate_settings().validate()?;
        if !(self.increment > 0.0) {
            return Err(invalid("control increment must be positive"));
        }
        if self.max_increments == 0 {
            return Err(invalid("max_increments must be at least 1"));
        }
        Ok(())
    }

    fn equilibrate_settings(&self) -> EquilibrateSettings {
        EquilibrateSettings {
            tolerance: self.tolerance,
            step: self.step,
            time_budget: self.time_budget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub triggers: Vec<usize>,
    /// Whether every trigger node's tip state flipped.
    pub trigger_tipped: bool,
    pub increments: usize,
    /// Control of each trigger when the ratchet stopped, in `triggers` order.
    pub final_controls: Vec<f64>,
    /// `None` when an equilibration ran out of budget.
    pub cascade_size: Option<usize>,
    /// Non-trigger nodes whose tip state changed.
    pub tipped_nodes: Vec<usize>,
}

impl CascadeOutcome {
    /// Cascade size with `NaN` standing in for "no equilibrium", for sweeps
    /// that collect plain numbers.
    pub fn cascade_size_or_nan(&self) -> f64 {
        self.cascade_size.map_or(f64::NAN, |n| n as f64)
    }
}

/// Ratchets `trigger`'s control parameter until it tips.
///
/// Configuration problems are returned as errors. Running out of the
/// equilibration budget is not an error: the outcome carries
/// `cascade_size: None` so a sweep can keep going.
pub fn trigger_cascade(
    evolver: &mut Evolver,
    trigger: usize,
    settings: &CascadeSettings,
) -> Result<CascadeOutcome> {
    trigger_cascade_group(evolver, &[trigger], settings)
}

/// Ratchets the controls of all `triggers` together, one increment each per
/// step, until every one of them has tipped.
pub fn trigger_cascade_group(
    evolver: &mut Evolver,
    triggers: &[usize],
    settings: &CascadeSettings,
) -> Result<CascadeOutcome> {
    settings.validate()?;
    if triggers.is_empty() {
        return Err(invalid("at least one trigger node is required"));
    }
    for (i, id) in triggers.iter().enumerate() {
        if triggers[..i].contains(id) {
            return Err(invalid(format!("trigger node {id} is listed twice")));
        }
    }
    let mut controls = triggers
        .iter()
        .map(|&id| evolver.network().element(id).map(|e| e.control()))
        .collect::<Result<Vec<f64>>>()?;
    let eq = settings.equilibrate_settings();

    let no_equilibrium = |increments, final_controls| CascadeOutcome {
        triggers: triggers.to_vec(),
        trigger_tipped: false,
        increments,
        final_controls,
        cascade_size: None,
        tipped_nodes: Vec::new(),
    };

    match evolver.equilibrate_with(eq) {
        Ok(()) => {}
        Err(err @ TippingError::NotConverged { .. }) => {
            log::warn!("{err}");
            return Ok(no_equilibrium(0, controls));
        }
        Err(err) => return Err(err),
    }
    if !evolver.is_stable() {
        log::warn!("Initial state is not a stable point of the system.");
    }

    let before = evolver.tip_states();
    let all_flipped = |now: &[bool]| triggers.iter().all(|&id| now[id] != before[id]);
    let mut increments = 0;
    while increments < settings.max_increments {
        increments += 1;
        for (&id, control) in triggers.iter().zip(controls.iter_mut()) {
            *control += settings.increment;
            evolver.set_control(id, *control)?;
        }
        match evolver.equilibrate_with(eq) {
            Ok(()) => {}
            Err(err @ TippingError::NotConverged { .. }) => {
                log::warn!("{err}");
                return Ok(no_equilibrium(increments, controls));
            }
            Err(err) => return Err(err),
        }
        log::debug!(
            "Ratchet step {increments}: controls {controls:?} on {triggers:?}, state = {:?}",
            evolver.state()
        );
        if all_flipped(&evolver.tip_states()) {
            break;
        }
    }

    let after = evolver.tip_states();
    let tipped_nodes: Vec<usize> = before
        .iter()
        .zip(&after)
        .enumerate()
        .filter(|&(i, (b, a))| !triggers.contains(&i) && b != a)
        .map(|(i, _)| i)
        .collect();

    Ok(CascadeOutcome {
        triggers: triggers.to_vec(),
        trigger_tipped: all_flipped(&after),
        increments,
        final_controls: controls,
        cascade_size: Some(tipped_nodes.len()),
        tipped_nodes,
    })
}

/// Plain, serializable record of one cascade run, including the network it
/// ran on so the run can be rebuilt later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeRecord {
    pub label: String,
    pub triggers: Vec<usize>,
    pub cascade_size: Option<usize>,
    pub tipped_nodes: Vec<usize>,
    pub network: NetworkSpec,
    pub trajectory: Trajectory,
}

impl CascadeRecord {
    pub fn new(label: impl Into<String>, outcome: &CascadeOutcome, evolver: &Evolver) -> Self {
        Self {
            label: label.into(),
            triggers: outcome.triggers.clone(),
            cascade_size: outcome.cascade_size,
            tipped_nodes: outcome.tipped_nodes.clone(),
            network: evolver.network().clone().into(),
            trajectory: evolver.trajectory().clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeCatalog {
    records: Vec<CascadeRecord>,
}

impl CascadeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: CascadeRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[CascadeRecord] {
        &self.records
    }

    /// Histogram of cascade sizes; runs without equilibrium are skipped.
    pub fn size_counts(&self) -> Vec<usize> {
        let mut counts = Vec::new();
        for size in self.records.iter().filter_map(|r| r.cascade_size) {
            if counts.len() <= size {
                counts.resize(size + 1, 0);
            }
            counts[size] += 1;
        }
        counts
    }

    pub fn write_json(&self, writer: impl Write) -> anyhow::Result<()> {
        serde_json::to_writer(writer, self).context("Failed to write cascade catalog.")
    }

    pub fn read_json(reader: impl Read) -> anyhow::Result<Self> {
        serde_json::from_reader(reader).context("Failed to read cascade catalog.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling::Coupling;
    use crate::element::Element;
    use crate::network::TippingNetwork;

    fn chain(strength: f64) -> Evolver {
        let mut net = TippingNetwork::new();
        net.add_element(Element::cusp(-1.0, 1.0, 0.0, 0.0));
        net.add_element(Element::cusp(-1.0, 1.0, 0.0, 0.0));
        net.add_coupling(0, 1, Coupling::linear(strength)).unwrap();
        Evolver::new(net, &[-1.0, -1.0]).unwrap()
    }

    fn settings() -> CascadeSettings {
        CascadeSettings {
            tolerance: 1e-4,
            increment: 0.01,
            ..CascadeSettings::default()
        }
    }

    #[test]
    fn strong_chain_propagates() {
        let mut ev = chain(0.5);
        let outcome = trigger_cascade(&mut ev, 0, &settings()).unwrap();
        assert!(outcome.trigger_tipped);
        assert_eq!(outcome.cascade_size, Some(1));
        assert_eq!(outcome.tipped_nodes, vec![1]);
        assert!(outcome.final_controls[0] > 0.3 && outcome.final_controls[0] < 0.5);
    }

    #[test]
    fn uncoupled_chain_does_not_propagate() {
        let mut ev = chain(0.0);
        let outcome = trigger_cascade(&mut ev, 0, &settings()).unwrap();
        assert!(outcome.trigger_tipped);
        assert_eq!(outcome.cascade_size, Some(0));
        assert_eq!(outcome.cascade_size_or_nan(), 0.0);
    }

    #[test]
    fn budget_of_increments_is_respected() {
        let mut ev = chain(0.5);
        let limited = CascadeSettings {
            max_increments: 3,
            ..settings()
        };
        let outcome = trigger_cascade(&mut ev, 0, &limited).unwrap();
        assert!(!outcome.trigger_tipped);
        assert_eq!(outcome.increments, 3);
        assert_eq!(outcome.cascade_size, Some(0));
    }

    #[test]
    fn configuration_errors_are_not_swallowed() {
        let mut ev = chain(0.5);
        assert!(matches!(
            trigger_cascade(&mut ev, 4, &settings()),
            Err(TippingError::UnknownNode { id: 4, len: 2 })
        ));
        let bad = CascadeSettings {
            increment: 0.0,
            ..settings()
        };
        assert!(trigger_cascade(&mut ev, 0, &bad).is_err());
    }

    #[test]
    fn grouped_triggers_tip_together_and_drive_a_shared_target() {
        let mut net = TippingNetwork::new();
        for _ in 0..3 {
            net.add_element(Element::cusp(-1.0, 1.0, 0.0, 0.0));
        }
        net.add_coupling(0, 2, Coupling::linear(0.3)).unwrap();
        net.add_coupling(1, 2, Coupling::linear(0.3)).unwrap();
        let mut ev = Evolver::new(net, &[-1.0, -1.0, -1.0]).unwrap();

        let outcome = trigger_cascade_group(&mut ev, &[0, 1], &settings()).unwrap();
        assert!(outcome.trigger_tipped);
        assert_eq!(outcome.triggers, vec![0, 1]);
        assert_eq!(outcome.final_controls.len(), 2);
        assert_eq!(outcome.final_controls[0], outcome.final_controls[1]);
        assert_eq!(outcome.tipped_nodes, vec![2]);
        assert_eq!(outcome.cascade_size, Some(1));
        assert_eq!(ev.tip_states(), vec![true, true, true]);
    }

    #[test]
    fn trigger_lists_must_be_non_empty_and_distinct() {
        let mut ev = chain(0.5);
        assert!(matches!(
            trigger_cascade_group(&mut ev, &[], &settings()),
            Err(TippingError::InvalidSetting(_))
        ));
        assert!(matches!(
            trigger_cascade_group(&mut ev, &[0, 0], &settings()),
            Err(TippingError::InvalidSetting(_))
        ));
        assert_eq!(ev.trajectory().len(), 1);
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let mut ev = chain(0.5);
        let outcome = trigger_cascade(&mut ev, 0, &settings()).unwrap();
        let mut catalog = CascadeCatalog::new();
        catalog.push(CascadeRecord::new("chain", &outcome, &ev));

        let mut buffer = Vec::new();
        catalog.write_json(&mut buffer).unwrap();
        let back = CascadeCatalog::read_json(buffer.as_slice()).unwrap();
        assert_eq!(back, catalog);
        assert_eq!(back.size_counts(), vec![0, 1]);

        let record = &back.records()[0];
        assert_eq!(record.triggers, vec![0]);
        let rebuilt = TippingNetwork::try_from(record.network.clone()).unwrap();
        let x = [0.4, -0.7];
        assert_eq!(rebuilt.f(&x, 0.0).unwrap(), ev.network().f(&x, 0.0).unwrap());
        assert_eq!(rebuilt.element(0).unwrap().control(), outcome.final_controls[0]);
        let last = record.trajectory.len() - 1;
        assert_eq!(
            record.trajectory.tip_states_at(ev.network(), last).unwrap(),
            ev.tip_states()
        );
    }
}
