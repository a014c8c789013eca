use crate::error::{invalid, Result};
use crate::network::TippingNetwork;
use serde::{Deserialize, Serialize};

/// Saved history of an evolver: parallel sequences of times, states and,
/// for deterministic runs, the control parameters in force at each save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    #[serde(default)]
    pub controls: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: f64, state: &[f64]) {
        self.times.push(t);
        self.states.push(state.to_vec());
    }

    pub fn push_with_controls(&mut self, t: f64, state: &[f64], controls: Vec<f64>) {
        self.push(t, state);
        self.controls.push(controls);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &[f64])> {
        Some((*self.times.last()?, self.states.last()?.as_slice()))
    }

    pub fn timeseries(&self) -> (&[f64], &[Vec<f64>]) {
        (&self.times, &self.states)
    }

    /// Time series of a single node.
    pub fn component(&self, node: usize) -> Vec<f64> {
        self.states
            .iter()
            .filter_map(|s| s.get(node).copied())
            .collect()
    }

    pub fn tip_states_at(&self, network: &TippingNetwork, index: usize) -> Result<Vec<bool>> {
        let state = self.states.get(index).ok_or_else(|| {
            invalid(format!(
                "trajectory has {} save points, no index {}",
                self.len(),
                index
            ))
        })?;
        network.get_tip_states(state)
    }
}
