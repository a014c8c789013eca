use crate::network::TippingNetwork;
use crate::traits::{DynamicalSystem, JacobianSystem};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{Complex, DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumResult {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major Jacobian at `state`.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex<f64>>,
}

impl EquilibriumResult {
    pub fn is_stable(&self) -> bool {
        all_negative(&self.eigenvalues)
    }
}

/// Finds a zero of the network's vector field near `initial_guess` by
/// Newton's method, evaluating the Jacobian analytically.
pub fn solve_equilibrium(
    network: &TippingNetwork,
    t: f64,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<EquilibriumResult> {
    let dim = network.dimension();
    if dim == 0 {
        bail!("Network has no nodes.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.damping <= 0.0 {
        bail!("damping must be positive.");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive.");
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    network.apply(t, &state, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    while residual_norm > settings.tolerance {
        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let jacobian = network.jacobian(t, &state);
        let delta = solve_linear_system(jacobian, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;
        for (s, d) in state.iter_mut().zip(delta.iter()) {
            *s -= settings.damping * d;
        }

        iterations += 1;
        network.apply(t, &state, &mut residual);
        residual_norm = l2_norm(&residual);
    }

    let jacobian = network.jacobian(t, &state);
    let eigenvalues = eigenvalues(&jacobian);
    let jacobian = (0..dim)
        .flat_map(|i| (0..dim).map(move |j| (i, j)))
        .map(|(i, j)| jacobian[(i, j)])
        .collect();

    Ok(EquilibriumResult {
        state,
        residual_norm,
        iterations,
        jacobian,
        eigenvalues,
    })
}

fn solve_linear_system(jacobian: DMatrix<f64>, residual: &[f64]) -> Result<DVector<f64>> {
    let rhs = DVector::from_column_slice(residual);
    jacobian
        .lu()
        .solve(&rhs)
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

pub fn eigenvalues(matrix: &DMatrix<f64>) -> Vec<Complex<f64>> {
    if matrix.nrows() == 0 {
        return Vec::new();
    }
    matrix.complex_eigenvalues().iter().copied().collect()
}

/// All eigenvalues have strictly negative real part.
pub fn is_stable_matrix(matrix: &DMatrix<f64>) -> bool {
    all_negative(&eigenvalues(matrix))
}

fn all_negative(values: &[Complex<f64>]) -> bool {
    values.iter().all(|v| v.re < 0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalControl {
    /// Largest control value at which the tracked equilibrium was stable.
    pub control: f64,
    /// Equilibrium state at that control value.
    pub state: Vec<f64>,
    pub steps: usize,
}

/// Raises `node`'s control parameter in increments of `resolution`,
/// re-solving the equilibrium from the previous one each time, until the
/// tracked equilibrium loses stability, Newton fails to find it, or Newton
/// lands on a branch with a different tip state (the tracked branch ended in
/// a fold). The caller's network is not modified.
pub fn critical_control(
    network: &TippingNetwork,
    node: usize,
    resolution: f64,
    initial_guess: &[f64],
    max_steps: usize,
) -> Result<CriticalControl> {
    if resolution <= 0.0 {
        bail!("resolution must be positive.");
    }
    let mut net = network.clone();
    let mut control = net.element(node)?.control();
    let start = solve_equilibrium(&net, 0.0, initial_guess, NewtonSettings::default())
        .context("No equilibrium near the initial guess.")?;
    if !start.is_stable() {
        bail!("Initial equilibrium is not stable.");
    }

    let mut state = start.state;
    let tip_states = net.get_tip_states(&state)?;
    for step in 0..max_steps {
        net.set_control(node, control + resolution)?;
        match solve_equilibrium(&net, 0.0, &state, NewtonSettings::default()) {
            Ok(next) if next.is_stable() && net.get_tip_states(&next.state)? == tip_states => {
                control += resolution;
                state = next.state;
            }
            _ => {
                return Ok(CriticalControl {
                    control,
                    state,
                    steps: step,
                })
            }
        }
    }
    bail!(
        "Equilibrium still stable after {} increments of {}.",
        max_steps,
        resolution
    )
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling::Coupling;
    use crate::element::Element;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn single_cusp(c: f64) -> TippingNetwork {
        let mut net = TippingNetwork::new();
        net.add_element(Element::cusp(-1.0, 1.0, c, 0.0));
        net
    }

    #[test]
    fn newton_finds_each_cusp_branch() {
        let net = single_cusp(0.0);
        for (guess, root, stable) in [(-1.3, -1.0, true), (0.2, 0.0, false), (1.4, 1.0, true)] {
            let result = solve_equilibrium(&net, 0.0, &[guess], NewtonSettings::default())
                .expect("equilibrium should converge");
            assert!((result.state[0] - root).abs() < 1e-8);
            assert_eq!(result.is_stable(), stable);
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        let net = single_cusp(0.0);
        assert_err_contains(
            solve_equilibrium(&TippingNetwork::new(), 0.0, &[], NewtonSettings::default()),
            "no nodes",
        );
        assert_err_contains(
            solve_equilibrium(&net, 0.0, &[0.0, 1.0], NewtonSettings::default()),
            "dimension mismatch",
        );
        let settings = NewtonSettings {
            damping: 0.0,
            ..NewtonSettings::default()
        };
        assert_err_contains(solve_equilibrium(&net, 0.0, &[1.0], settings), "damping");
    }

    #[test]
    fn stability_of_matrices() {
        let stable = DMatrix::from_row_slice(2, 2, &[-1.0, 5.0, 0.0, -0.1]);
        assert!(is_stable_matrix(&stable));
        let rotation = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        assert!(!is_stable_matrix(&rotation));
        let damped = DMatrix::from_row_slice(2, 2, &[-0.1, -1.0, 1.0, -0.1]);
        assert!(is_stable_matrix(&damped));
    }

    #[test]
    fn critical_control_lands_near_the_fold() {
        let net = single_cusp(0.0);
        let critical = critical_control(&net, 0, 1e-3, &[-1.0], 10_000).unwrap();
        let fold = (4.0f64 / 27.0).sqrt();
        assert!((critical.control - fold).abs() < 5e-3, "{}", critical.control);
        assert!(critical.state[0] < -0.5);
        assert_eq!(net.element(0).unwrap().control(), 0.0);
    }

    #[test]
    fn coupling_lowers_the_critical_control() {
        let mut net = TippingNetwork::new();
        net.add_element(Element::cusp(-1.0, 1.0, 0.0, 0.0));
        net.add_element(Element::cusp(-1.0, 1.0, 0.0, 0.0));
        net.add_coupling(0, 1, Coupling::offset_linear(0.1, -1.0)).unwrap();
        let lone = critical_control(&single_cusp(0.0), 0, 1e-3, &[-1.0], 10_000).unwrap();
        let driven = critical_control(&net, 1, 1e-3, &[-1.0, -1.0], 10_000).unwrap();
        assert!((lone.control - driven.control).abs() < 5e-3);

        let mut pushed = net.clone();
        pushed.set_param(0, "c", 0.5).unwrap();
        let upstream_tipped = critical_control(&pushed, 1, 1e-3, &[1.1, -0.9], 10_000).unwrap();
        assert!(upstream_tipped.control < lone.control - 0.1);
    }
}
