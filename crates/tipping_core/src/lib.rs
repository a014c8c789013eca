//! The `tipping_core` crate simulates tipping cascades: networks of coupled
//! bistable or oscillating elements whose local switches propagate along
//! directed couplings.
//!
//! Key components:
//! - **Elements and couplings**: tagged variants implementing `LocalDynamics`
//!   and `CouplingDynamics`.
//! - **Network**: directed graph compiling node and edge dynamics into a
//!   vector field `f(x, t)` and a dense Jacobian.
//! - **Evolvers**: deterministic integration with equilibrium and stability
//!   checks, and stochastic integration with Gaussian, Lévy, Cauchy or
//!   alpha-stable noise.
//! - **Cascades**: control-parameter ratchet measuring how many nodes follow
//!   a forced tip, plus a serializable catalog of runs.
pub mod cascade;
pub mod coupling;
pub mod element;
pub mod equilibrium;
pub mod error;
pub mod evolve;
pub mod network;
pub mod solvers;
pub mod stochastic;
pub mod traits;
pub mod trajectory;

pub use cascade::{
    trigger_cascade, trigger_cascade_group, CascadeCatalog, CascadeOutcome, CascadeRecord,
    CascadeSettings,
};
pub use coupling::{Coupling, CouplingKind};
pub use element::{Calibration, CalibratedCusp, Cusp, Element, ElementKind, Hopf};
pub use error::{Result, TippingError};
pub use evolve::{EquilibrateSettings, Evolver};
pub use network::{Edge, NetworkSpec, TippingNetwork};
pub use solvers::Stepper;
pub use stochastic::{NoiseConfig, NoiseKind, SdeScheme, StochasticEvolver, StochasticSettings};
pub use trajectory::Trajectory;
