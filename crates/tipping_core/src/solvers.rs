use crate::traits::{DynamicalSystem, JacobianSystem, Scalar, Steppable};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Classic Runge-Kutta 4th order solver.
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

fn axpy<T: Scalar>(out: &mut [T], base: &[T], scale: T, k: &[T]) {
    for ((o, &b), &ki) in out.iter_mut().zip(base).zip(k) {
        *o = b + scale * ki;
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let two = T::one() + T::one();
        let half_dt = dt / two;
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);
        axpy(&mut self.tmp, state, half_dt, &self.k1);
        system.apply(t0 + half_dt, &self.tmp, &mut self.k2);
        axpy(&mut self.tmp, state, half_dt, &self.k2);
        system.apply(t0 + half_dt, &self.tmp, &mut self.k3);
        axpy(&mut self.tmp, state, dt, &self.k3);
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        let sixth = dt / T::from_f64(6.0).unwrap_or_else(|| two * (two + T::one()));
        for (i, s) in state.iter_mut().enumerate() {
            *s = *s + sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }
        *t = t0 + dt;
    }
}

/// Settings for the Newton iteration inside implicit steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImplicitSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ImplicitSettings {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-12,
        }
    }
}

/// Backward Euler: solves `y - dt f(y, t + dt) = x` by Newton's method with
/// the exact Jacobian. Falls back to one RK4 step when Newton fails.
pub struct BackwardEuler {
    settings: ImplicitSettings,
    residual: Vec<f64>,
    guess: Vec<f64>,
    fallback: RK4<f64>,
}

impl BackwardEuler {
    pub fn new(dim: usize) -> Self {
        Self::with_settings(dim, ImplicitSettings::default())
    }

    pub fn with_settings(dim: usize, settings: ImplicitSettings) -> Self {
        Self {
            settings,
            residual: vec![0.0; dim],
            guess: vec![0.0; dim],
            fallback: RK4::new(dim),
        }
    }

    pub fn step(&mut self, system: &impl JacobianSystem, t: &mut f64, state: &mut [f64], dt: f64) {
        let dim = state.len();
        let t_next = *t + dt;
        self.guess.copy_from_slice(state);

        for _ in 0..self.settings.max_iterations {
            system.apply(t_next, &self.guess, &mut self.residual);
            let mut norm = 0.0f64;
            for i in 0..dim {
                self.residual[i] = self.guess[i] - state[i] - dt * self.residual[i];
                norm = norm.max(self.residual[i].abs());
            }
            let scale = 1.0 + self.guess.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if norm <= self.settings.tolerance * scale {
                state.copy_from_slice(&self.guess);
                *t = t_next;
                return;
            }

            let jac = system.jacobian(t_next, &self.guess);
            let lhs = DMatrix::identity(dim, dim) - jac * dt;
            let rhs = DVector::from_column_slice(&self.residual);
            match lhs.lu().solve(&rhs) {
                Some(delta) => {
                    for i in 0..dim {
                        self.guess[i] -= delta[i];
                    }
                }
                None => break,
            }
            if self.guess.iter().any(|v| !v.is_finite()) {
                break;
            }
        }

        log::warn!(
            "Implicit Euler Newton iteration did not converge at t = {}; taking an explicit RK4 step.",
            *t
        );
        self.fallback.step(system, t, state, dt);
    }
}

/// Fixed-step integrator used by the deterministic evolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stepper {
    #[default]
    Rk4,
    BackwardEuler,
}

impl Stepper {
    pub(crate) fn build(self, dim: usize) -> InternalStepper {
        match self {
            Stepper::Rk4 => InternalStepper::Rk4(RK4::new(dim)),
            Stepper::BackwardEuler => InternalStepper::BackwardEuler(BackwardEuler::new(dim)),
        }
    }
}

pub(crate) enum InternalStepper {
    Rk4(RK4<f64>),
    BackwardEuler(BackwardEuler),
}

impl InternalStepper {
    pub(crate) fn step(
        &mut self,
        system: &impl JacobianSystem,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) {
        match self {
            InternalStepper::Rk4(s) => s.step(system, t, state, dt),
            InternalStepper::BackwardEuler(s) => s.step(system, t, state, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = self.rate * x[0];
        }
    }

    impl JacobianSystem for Decay {
        fn jacobian(&self, _t: f64, _x: &[f64]) -> DMatrix<f64> {
            DMatrix::from_element(1, 1, self.rate)
        }
    }

    struct Clock;

    impl DynamicalSystem<f64> for Clock {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = 3.0 * t * t;
        }
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let system = Decay { rate: -0.5 };
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut x = [1.0];
        for _ in 0..100 {
            solver.step(&system, &mut t, &mut x, 0.01);
        }
        assert!((t - 1.0).abs() < 1e-12);
        assert!((x[0] - (-0.5f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn rk4_integrates_time_dependent_field_exactly() {
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut x = [0.0];
        solver.step(&Clock, &mut t, &mut x, 2.0);
        assert!((x[0] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn backward_euler_solves_linear_step_exactly() {
        let system = Decay { rate: -2.0 };
        let mut solver = BackwardEuler::new(1);
        let mut t = 0.0;
        let mut x = [1.0];
        solver.step(&system, &mut t, &mut x, 0.5);
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!((t - 0.5).abs() < 1e-15);
    }

    #[test]
    fn backward_euler_is_stable_for_stiff_decay() {
        let system = Decay { rate: -1000.0 };
        let mut solver = BackwardEuler::new(1);
        let mut t = 0.0;
        let mut x = [1.0];
        for _ in 0..10 {
            solver.step(&system, &mut t, &mut x, 0.1);
        }
        assert!(x[0].abs() < 1e-10);
    }
}
