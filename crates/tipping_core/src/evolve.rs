//! Deterministic integration of a tipping network.
//!
//! The evolver owns the network, the current `(t, x)` and the saved
//! trajectory. Every call advances in fixed steps of the requested size and
//! saves after each step; equilibrium is only checked between full steps.

use crate::equilibrium::eigenvalues;
use crate::error::{invalid, Result, TippingError};
use crate::network::TippingNetwork;
use crate::solvers::{InternalStepper, Stepper};
use crate::traits::{DynamicalSystem, JacobianSystem};
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquilibrateSettings {
    /// Every component of `f` must be below this in absolute value.
    pub tolerance: f64,
    pub step: f64,
    /// Wall-clock budget; `None` waits indefinitely.
    pub time_budget: Option<Duration>,
}

impl Default for EquilibrateSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.005,
            step: 0.1,
            time_budget: Some(Duration::from_secs(30)),
        }
    }
}

impl EquilibrateSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(invalid("equilibrium tolerance must be positive"));
        }
        validate_step(self.step)
    }
}

pub(crate) fn validate_horizon(t_end: f64) -> Result<()> {
    if t_end.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("end time must be finite, got {t_end}")))
    }
}

pub(crate) fn validate_step(step: f64) -> Result<()> {
    if step > 0.0 && step.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("step size must be positive and finite, got {step}")))
    }
}

pub struct Evolver {
    network: TippingNetwork,
    stepper: InternalStepper,
    t: f64,
    x: Vec<f64>,
    init_tip_state: Vec<bool>,
    trajectory: Trajectory,
}

impl Evolver {
    pub fn new(network: TippingNetwork, initial_state: &[f64]) -> Result<Self> {
        Self::with_stepper(network, initial_state, Stepper::default())
    }

    pub fn with_stepper(
        network: TippingNetwork,
        initial_state: &[f64],
        stepper: Stepper,
    ) -> Result<Self> {
        let init_tip_state = network.get_tip_states(initial_state)?;
        let mut trajectory = Trajectory::new();
        trajectory.push_with_controls(0.0, initial_state, network.controls());
        Ok(Self {
            stepper: stepper.build(network.node_count()),
            network,
            t: 0.0,
            x: initial_state.to_vec(),
            init_tip_state,
            trajectory,
        })
    }

    pub fn network(&self) -> &TippingNetwork {
        &self.network
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn state(&self) -> &[f64] {
        &self.x
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }

    /// Changes a node parameter between integration segments.
    pub fn set_param(&mut self, node: usize, key: &str, value: f64) -> Result<()> {
        self.network.set_param(node, key, value)
    }

    pub fn set_control(&mut self, node: usize, value: f64) -> Result<()> {
        self.network.set_control(node, value)
    }

    /// Advances by `step` until the saved time reaches `t_end`.
    pub fn integrate(&mut self, step: f64, t_end: f64) -> Result<()> {
        validate_step(step)?;
        validate_horizon(t_end)?;
        while self.t < t_end {
            self.advance(step);
        }
        Ok(())
    }

    fn advance(&mut self, step: f64) {
        self.stepper
            .step(&self.network, &mut self.t, &mut self.x, step);
        self.trajectory
            .push_with_controls(self.t, &self.x, self.network.controls());
    }

    /// Every component of `f(x, t)` is below `tol` in absolute value.
    pub fn is_equilibrium(&self, tol: f64) -> bool {
        let mut f = vec![0.0; self.x.len()];
        self.network.apply(self.t, &self.x, &mut f);
        f.iter().all(|v| v.abs() < tol)
    }

    /// Every eigenvalue of the Jacobian at the current state has negative
    /// real part. Only meaningful at an equilibrium.
    pub fn is_stable(&self) -> bool {
        let jac = self.network.jacobian(self.t, &self.x);
        eigenvalues(&jac).iter().all(|v| v.re < 0.0)
    }

    /// Steps until [`Evolver::is_equilibrium`] holds. Fails with
    /// [`TippingError::NotConverged`] once the wall-clock budget is spent.
    pub fn equilibrate(&mut self, tol: f64, step: f64, t_break: Option<Duration>) -> Result<()> {
        self.equilibrate_with(EquilibrateSettings {
            tolerance: tol,
            step,
            time_budget: t_break,
        })
    }

    pub fn equilibrate_with(&mut self, settings: EquilibrateSettings) -> Result<()> {
        settings.validate()?;
        let start = Instant::now();
        while !self.is_equilibrium(settings.tolerance) {
            self.advance(settings.step);
            let elapsed = start.elapsed();
            let diverged = self.x.iter().any(|v| !v.is_finite());
            if diverged {
                log::warn!("State became non-finite at t = {}; reduce the step size.", self.t);
            }
            if diverged || settings.time_budget.is_some_and(|budget| elapsed >= budget) {
                return Err(TippingError::NotConverged {
                    elapsed,
                    last_state: self.x.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn tip_states(&self) -> Vec<bool> {
        self.network
            .get_tip_states(&self.x)
            .unwrap_or_else(|_| vec![false; self.x.len()])
    }

    /// Number of nodes whose tip state differs from the initial one.
    pub fn number_tipped(&self) -> usize {
        self.init_tip_state
            .iter()
            .zip(self.tip_states())
            .filter(|(before, after)| **before != *after)
            .count()
    }
}
