use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point type the generic steppers work over.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A continuous-time vector field `dx/dt = f(x, t)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Number of state components.
    fn dimension(&self) -> usize;

    /// Writes `f(x, t)` into `out`, which has `dimension()` entries.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A vector field that can also supply its exact Jacobian.
pub trait JacobianSystem: DynamicalSystem<f64> {
    /// Dense Jacobian `d f_i / d x_j` at `(x, t)`.
    fn jacobian(&self, t: f64, x: &[f64]) -> DMatrix<f64>;
}

/// Fixed-step integrator. Advances `t` and `state` in place by `dt`.
pub trait Steppable<T: Scalar> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// Node-local dynamics of a tipping element.
pub trait LocalDynamics {
    /// Local rate of change `dx/dt` ignoring couplings.
    fn rate(&self, t: f64, x: f64) -> f64;

    /// Derivative of [`LocalDynamics::rate`] with respect to `x`.
    fn d_rate(&self, t: f64, x: f64) -> f64;

    /// Whether `x` lies in the tipped regime.
    fn is_tipped(&self, x: f64) -> bool;
}

/// Dynamics carried by a directed edge `from -> to`.
pub trait CouplingDynamics {
    /// Term added to the target's rate of change.
    fn coupling(&self, t: f64, x_from: f64, x_to: f64) -> f64;

    /// Partial derivative of the coupling term with respect to `x_from`.
    fn d_from(&self, t: f64, x_from: f64, x_to: f64) -> f64;

    /// Partial derivative of the coupling term with respect to `x_to`.
    fn d_to(&self, t: f64, x_from: f64, x_to: f64) -> f64;
}
