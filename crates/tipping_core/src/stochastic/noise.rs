//! Noise configuration and increment sampling.

use crate::error::{invalid, Result, TippingError};
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Increments are clipped to `±INCREMENT_BOUND` before they reach a solver.
pub const INCREMENT_BOUND: f64 = 1e8;

/// Below this stability index the CMS transform loses accuracy.
pub const MIN_RELIABLE_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NoiseKind {
    /// Brownian increments, `sigma * dW`.
    Gaussian,
    /// One-sided Lévy jump of the given scale on top of a Brownian increment.
    Levy { scale: f64 },
    /// Cauchy jumps of the given scale. Not scaled with the step size.
    Cauchy { scale: f64 },
    /// Symmetric alpha-stable increments with per-node index and timescale.
    AlphaStable { alpha: Vec<f64>, tau: Vec<f64> },
}

/// Additive diagonal noise: node `j` receives `sigma[j]` times an increment
/// drawn according to `kind`. A zero `sigma` leaves the node deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub sigma: Vec<f64>,
    pub kind: NoiseKind,
}

impl NoiseConfig {
    pub fn gaussian(sigma: Vec<f64>) -> Self {
        Self {
            sigma,
            kind: NoiseKind::Gaussian,
        }
    }

    pub fn levy(sigma: Vec<f64>, scale: f64) -> Self {
        Self {
            sigma,
            kind: NoiseKind::Levy { scale },
        }
    }

    pub fn cauchy(sigma: Vec<f64>, scale: f64) -> Self {
        Self {
            sigma,
            kind: NoiseKind::Cauchy { scale },
        }
    }

    pub fn alpha_stable(sigma: Vec<f64>, alpha: Vec<f64>, tau: Vec<f64>) -> Self {
        Self {
            sigma,
            kind: NoiseKind::AlphaStable { alpha, tau },
        }
    }

    /// No noise on any of `dim` nodes.
    pub fn silent(dim: usize) -> Self {
        Self::gaussian(vec![0.0; dim])
    }

    pub fn validate(&self, dim: usize) -> Result<()> {
        check_len(dim, self.sigma.len())?;
        if self.sigma.iter().any(|s| !(s.is_finite() && *s >= 0.0)) {
            return Err(invalid("noise amplitudes must be finite and non-negative"));
        }
        match &self.kind {
            NoiseKind::Gaussian => {}
            NoiseKind::Levy { scale } | NoiseKind::Cauchy { scale } => {
                if !(*scale > 0.0 && scale.is_finite()) {
                    return Err(invalid(format!("jump scale must be positive, got {scale}")));
                }
            }
            NoiseKind::AlphaStable { alpha, tau } => {
                check_len(dim, alpha.len())?;
                check_len(dim, tau.len())?;
                if let Some(a) = alpha.iter().find(|a| !(**a > 0.0 && **a <= 2.0)) {
                    return Err(invalid(format!("stability index must lie in (0, 2], got {a}")));
                }
                if tau.iter().any(|t| !(*t > 0.0 && t.is_finite())) {
                    return Err(invalid("noise timescales must be positive"));
                }
                for (node, a) in alpha.iter().enumerate() {
                    if *a < MIN_RELIABLE_ALPHA {
                        log::warn!(
                            "alpha = {a} on node {node} is below {MIN_RELIABLE_ALPHA}; \
                             alpha-stable samples are numerically unreliable."
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether this kind has the second Brownian component the generic
    /// scheme uses for its iterated integral.
    pub(crate) fn is_gaussian(&self) -> bool {
        matches!(self.kind, NoiseKind::Gaussian)
    }

    /// One clipped increment for `node` over a step of `dt`.
    pub(crate) fn draw<R: Rng + ?Sized>(&self, rng: &mut R, node: usize, dt: f64) -> f64 {
        let sigma = self.sigma[node];
        if sigma == 0.0 {
            return 0.0;
        }
        let raw = match &self.kind {
            NoiseKind::Gaussian => dt.sqrt() * rng.sample::<f64, _>(StandardNormal),
            NoiseKind::Levy { scale } => levy_increment(rng, *scale, dt),
            NoiseKind::Cauchy { scale } => cauchy_increment(rng, *scale),
            NoiseKind::AlphaStable { alpha, tau } => {
                let alpha = alpha[node];
                stable_scale(alpha, dt, tau[node]) * alpha_stable(rng, alpha)
            }
        };
        clip_increment(sigma * raw)
    }

    /// `n` consecutive increments for `node`.
    pub(crate) fn path<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        node: usize,
        dt: f64,
        n: usize,
    ) -> Vec<f64> {
        (0..n).map(|_| self.draw(rng, node, dt)).collect()
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(TippingError::DimensionMismatch { expected, actual })
    }
}

/// Scale turning a standard CMS sample into an increment over `dt`.
///
/// The extra `2^(-1/alpha)` makes `alpha = 2` produce increments of variance
/// `dt / tau`, the same as a Brownian increment.
fn stable_scale(alpha: f64, dt: f64, tau: f64) -> f64 {
    (dt / tau).powf(1.0 / alpha) * 2f64.powf(-1.0 / alpha)
}

/// `n` standard symmetric alpha-stable samples via Chambers-Mallows-Stuck.
pub fn alpha_stable_increments<R: Rng + ?Sized>(rng: &mut R, alpha: f64, n: usize) -> Vec<f64> {
    (0..n).map(|_| alpha_stable(rng, alpha)).collect()
}

fn alpha_stable<R: Rng + ?Sized>(rng: &mut R, alpha: f64) -> f64 {
    let u = rng.gen_range(-FRAC_PI_2..FRAC_PI_2);
    let w: f64 = rng.sample(Exp1);
    if alpha == 1.0 {
        return u.tan();
    }
    (alpha * u).sin() / u.cos().powf(1.0 / alpha)
        * ((u - alpha * u).cos() / w).powf((1.0 - alpha) / alpha)
}

/// Lévy (`alpha = 1/2`, totally skewed) jump of the given scale added to a
/// Brownian increment over `dt`.
pub fn levy_increment<R: Rng + ?Sized>(rng: &mut R, scale: f64, dt: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    let n: f64 = rng.sample(StandardNormal);
    scale / (z * z) + dt.sqrt() * n
}

/// Cauchy sample of the given scale, as the ratio of two standard normals.
pub fn cauchy_increment<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    let num: f64 = rng.sample(StandardNormal);
    let den: f64 = rng.sample(StandardNormal);
    scale * num / den
}

/// Maps NaN to zero and clamps everything else to `±INCREMENT_BOUND`.
pub fn clip_increment(value: f64) -> f64 {
    if value.is_nan() {
        log::warn!("Dropping NaN noise increment.");
        0.0
    } else if value.abs() > INCREMENT_BOUND {
        log::warn!("Clipping noise increment {value:e} to ±{INCREMENT_BOUND:e}.");
        value.clamp(-INCREMENT_BOUND, INCREMENT_BOUND)
    } else {
        value
    }
}
