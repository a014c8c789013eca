use crate::traits::DynamicalSystem;

/// Rößler's SRA1 stochastic Runge-Kutta scheme for additive noise
/// (strong order 1.5 for Gaussian increments).
///
/// The caller supplies the already scaled increments `G·ΔW` and an
/// independent `G·ΔZ` with the same law, used for the iterated integral
/// `I10 = h/2 (ΔW + ΔZ/√3)`. Non-Gaussian increments have no such pair;
/// pass zeros for `ΔZ`, which reduces the scheme to a weak
/// approximation that is only reasonable for small steps.
pub struct Sra1 {
    f0: Vec<f64>,
    f1: Vec<f64>,
    stage: Vec<f64>,
}

impl Sra1 {
    pub fn new(dim: usize) -> Self {
        Self {
            f0: vec![0.0; dim],
            f1: vec![0.0; dim],
            stage: vec![0.0; dim],
        }
    }

    pub fn step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
        dw: &[f64],
        dz: &[f64],
    ) {
        let t0 = *t;
        let inv_sqrt3 = 1.0 / 3f64.sqrt();

        system.apply(t0, state, &mut self.f0);
        for i in 0..state.len() {
            self.stage[i] =
                state[i] + 0.75 * dt * self.f0[i] + 0.75 * (dw[i] + dz[i] * inv_sqrt3);
        }
        system.apply(t0 + 0.75 * dt, &self.stage, &mut self.f1);

        for i in 0..state.len() {
            state[i] += dt * (self.f0[i] / 3.0 + 2.0 * self.f1[i] / 3.0) + dw[i];
        }
        *t = t0 + dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Linear(f64);

    impl DynamicalSystem<f64> for Linear {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = self.0 * x[0];
        }
    }

    #[test]
    fn without_noise_it_is_a_second_order_runge_kutta_step() {
        let mut scheme = Sra1::new(1);
        let (mut t, mut x) = (0.0, [1.0]);
        let h = 0.1;
        scheme.step(&Linear(-1.0), &mut t, &mut x, h, &[0.0], &[0.0]);
        // Ralston-type step on x' = -x reproduces 1 - h + h^2/2.
        assert!((x[0] - (1.0 - h + h * h / 2.0)).abs() < 1e-14);
        assert!((t - h).abs() < 1e-15);
    }

    #[test]
    fn pure_noise_is_added_once() {
        let mut scheme = Sra1::new(1);
        let (mut t, mut x) = (0.0, [0.0]);
        scheme.step(&Linear(0.0), &mut t, &mut x, 0.01, &[0.3], &[0.1]);
        assert!((x[0] - 0.3).abs() < 1e-15);
    }
}
