//! Integration of a tipping network under additive noise.
//!
//! Two schemes are available. The generic one is an SRA1 stochastic
//! Runge-Kutta step and works for any network. The semi-implicit one only
//! applies when every element has a cubic form and every coupling is linear
//! in its source: each node's deterministic update is a backward Euler step
//! of its cubic, solved in closed form, after which the noise increment is
//! added. That step stays bounded for any step size, which is what makes
//! heavy-tailed alpha-stable forcing tractable.

pub mod cubic;
pub mod noise;
pub mod sra;

pub use cubic::{depressed_cubic_roots, solve_step};
pub use noise::{
    alpha_stable_increments, cauchy_increment, clip_increment, levy_increment, NoiseConfig,
    NoiseKind, INCREMENT_BOUND, MIN_RELIABLE_ALPHA,
};
pub use sra::Sra1;

use crate::error::{invalid, Result, TippingError};
use crate::evolve::{validate_horizon, validate_step};
use crate::network::TippingNetwork;
use crate::traits::{CouplingDynamics, DynamicalSystem};
use crate::trajectory::Trajectory;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdeScheme {
    /// Semi-implicit when the network and noise allow it, generic otherwise.
    #[default]
    Auto,
    Generic,
    SemiImplicit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StochasticSettings {
    pub scheme: SdeScheme,
    pub seed: u64,
}

pub struct StochasticEvolver {
    network: TippingNetwork,
    settings: StochasticSettings,
    rng: StdRng,
    t: f64,
    x: Vec<f64>,
    trajectory: Trajectory,
    last_path: Option<SdeScheme>,
    sra: Sra1,
}

impl StochasticEvolver {
    pub fn new(
        network: TippingNetwork,
        initial_state: &[f64],
        settings: StochasticSettings,
    ) -> Result<Self> {
        network.check_state(initial_state)?;
        let mut trajectory = Trajectory::new();
        trajectory.push(0.0, initial_state);
        Ok(Self {
            sra: Sra1::new(network.node_count()),
            rng: StdRng::seed_from_u64(settings.seed),
            network,
            settings,
            t: 0.0,
            x: initial_state.to_vec(),
            trajectory,
            last_path: None,
        })
    }

    pub fn network(&self) -> &TippingNetwork {
        &self.network
    }

    pub fn settings(&self) -> StochasticSettings {
        self.settings
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

    /// Scheme used by the most recent `integrate` or `equilibrate` call.
    pub fn last_path(&self) -> Option<SdeScheme> {
        self.last_path
    }

    pub fn set_param(&mut self, node: usize, key: &str, value: f64) -> Result<()> {
        self.network.set_param(node, key, value)
    }

    pub fn set_control(&mut self, node: usize, value: f64) -> Result<()> {
        self.network.set_control(node, value)
    }

    pub fn tip_states(&self) -> Vec<bool> {
        self.network
            .get_tip_states(&self.x)
            .unwrap_or_else(|_| vec![false; self.x.len()])
    }

    /// Every component of the deterministic drift is below `tol`.
    pub fn is_equilibrium(&self, tol: f64) -> bool {
        let mut f = vec![0.0; self.x.len()];
        self.network.apply(self.t, &self.x, &mut f);
        f.iter().all(|v| v.abs() < tol)
    }

    /// Advances in steps of `step` until `t_end`, saving every step.
    ///
    /// A non-finite state on the generic scheme stops the run with the
    /// recoverable [`TippingError::Diverged`]; the evolver keeps the last
    /// finite state and the steps saved before it.
    pub fn integrate(&mut self, step: f64, t_end: f64, noise: &NoiseConfig) -> Result<()> {
        validate_step(step)?;
        validate_horizon(t_end)?;
        noise.validate(self.network.node_count())?;
        let n = steps_until(self.t, t_end, step);
        let path = self.select_path(noise);
        match path {
            SdeScheme::SemiImplicit => self.run_semi_implicit(step, n, noise)?,
            _ => self.run_generic(step, n, noise)?,
        }
        self.last_path = Some(path);
        Ok(())
    }

    /// Steps the generic scheme until the drift vanishes within `tol`, or
    /// fails with [`TippingError::NotConverged`] once `budget` is spent or
    /// the state diverges.
    pub fn equilibrate(
        &mut self,
        tol: f64,
        step: f64,
        budget: Option<Duration>,
        noise: &NoiseConfig,
    ) -> Result<()> {
        if !(tol > 0.0) {
            return Err(invalid("equilibrium tolerance must be positive"));
        }
        validate_step(step)?;
        noise.validate(self.network.node_count())?;
        self.last_path = Some(SdeScheme::Generic);

        let start = Instant::now();
        while !self.is_equilibrium(tol) {
            let diverged = match self.run_generic(step, 1, noise) {
                Ok(()) => false,
                Err(TippingError::Diverged { .. }) => true,
                Err(err) => return Err(err),
            };
            let elapsed = start.elapsed();
            if diverged || budget.is_some_and(|budget| elapsed >= budget) {
                return Err(TippingError::NotConverged {
                    elapsed,
                    last_state: self.x.clone(),
                });
            }
        }
        Ok(())
    }

    fn select_path(&self, noise: &NoiseConfig) -> SdeScheme {
        let cubic_linear = self.network.is_cubic_linear();
        let path = match self.settings.scheme {
            SdeScheme::Auto => {
                let stable_noise = matches!(
                    noise.kind,
                    NoiseKind::Gaussian | NoiseKind::AlphaStable { .. }
                );
                if cubic_linear && stable_noise {
                    SdeScheme::SemiImplicit
                } else {
                    SdeScheme::Generic
                }
            }
            SdeScheme::SemiImplicit if !cubic_linear => {
                log::warn!(
                    "Semi-implicit scheme needs cubic elements and linear couplings; \
                     using the generic scheme."
                );
                SdeScheme::Generic
            }
            scheme => scheme,
        };
        log::debug!("Stochastic integration uses the {path:?} scheme.");
        path
    }

    /// Leaves the last finite state in place and fails with
    /// [`TippingError::Diverged`] when a step produces a non-finite value.
    fn run_generic(&mut self, step: f64, n: usize, noise: &NoiseConfig) -> Result<()> {
        let dim = self.x.len();
        let gaussian = noise.is_gaussian();
        let mut dw = vec![0.0; dim];
        let mut dz = vec![0.0; dim];
        let mut candidate = self.x.clone();
        let t0 = self.t;

        for k in 0..n {
            for j in 0..dim {
                dw[j] = noise.draw(&mut self.rng, j, step);
                if gaussian {
                    dz[j] = noise.draw(&mut self.rng, j, step);
                }
            }
            candidate.copy_from_slice(&self.x);
            let mut t = self.t;
            self.sra
                .step(&self.network, &mut t, &mut candidate, step, &dw, &dz);
            let t_next = t0 + (k + 1) as f64 * step;
            if candidate.iter().any(|v| !v.is_finite()) {
                log::warn!(
                    "Generic scheme diverged at t = {t_next}; keeping the state at t = {}.",
                    self.t
                );
                return Err(TippingError::Diverged {
                    time: t_next,
                    last_state: self.x.clone(),
                });
            }
            self.x.copy_from_slice(&candidate);
            self.t = t_next;
            self.trajectory.push(self.t, &self.x);
        }
        Ok(())
    }

    fn run_semi_implicit(&mut self, step: f64, n: usize, noise: &NoiseConfig) -> Result<()> {
        let cubics = self
            .network
            .elements()
            .iter()
            .map(|e| e.cubic_form())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid("semi-implicit scheme requires cubic elements"))?;
        let dim = cubics.len();
        let paths: Vec<Vec<f64>> = (0..dim)
            .map(|j| noise.path(&mut self.rng, j, step, n))
            .collect();

        let mut forcing = vec![0.0; dim];
        let mut next = vec![0.0; dim];
        let t0 = self.t;
        for k in 0..n {
            forcing.fill(0.0);
            for edge in self.network.edges() {
                let (x_from, x_to) = (self.x[edge.from], self.x[edge.to]);
                forcing[edge.to] += edge.coupling.coupling(self.t, x_from, x_to);
            }
            for (j, cusp) in cubics.iter().enumerate() {
                let u = self.x[j] - cusp.x_0;
                let y = solve_step(
                    -cusp.a * step,
                    1.0 - cusp.b * step,
                    -(u + step * (cusp.c + forcing[j])),
                    u,
                );
                next[j] = cusp.x_0 + y + paths[j][k];
            }
            self.x.copy_from_slice(&next);
            self.t = t0 + (k + 1) as f64 * step;
            self.trajectory.push(self.t, &self.x);
        }
        Ok(())
    }
}

/// Number of whole steps needed to reach `t_end` from `t`.
fn steps_until(t: f64, t_end: f64, step: f64) -> usize {
    if t_end <= t {
        0
    } else {
        ((t_end - t) / step - 1e-9).ceil() as usize
    }
}
