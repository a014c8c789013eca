//! Directed edge dynamics.
//!
//! Cross-type couplings read constants (angular velocity, amplitude rate)
//! from their endpoint elements. Those constants are filled in by
//! [`Coupling::bind`], which the network calls whenever an edge is added or
//! an endpoint's parameters change.

use crate::element::Element;
use crate::error::{Result, TippingError};
use crate::traits::CouplingDynamics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CouplingKind {
    Linear,
    OffsetLinear,
    CuspToHopf,
    HopfToCusp,
    HopfToHopf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Coupling {
    /// `strength * x_from`
    Linear { strength: f64 },
    /// `strength * (x_from - x_0)`
    OffsetLinear { strength: f64, x_0: f64 },
    /// `a_to * r_to * strength * x_from`
    CuspToHopf { strength: f64, a_to: f64 },
    /// `strength * r_from * cos(b_from * t)`
    HopfToCusp { strength: f64, b_from: f64 },
    /// `strength * r_from * cos((b_from - b_to) * t)`
    HopfToHopf { strength: f64, b_from: f64, b_to: f64 },
}

impl Coupling {
    pub fn linear(strength: f64) -> Self {
        Coupling::Linear { strength }
    }

    pub fn offset_linear(strength: f64, x_0: f64) -> Self {
        Coupling::OffsetLinear { strength, x_0 }
    }

    pub fn cusp_to_hopf(strength: f64) -> Self {
        Coupling::CuspToHopf { strength, a_to: 0.0 }
    }

    pub fn hopf_to_cusp(strength: f64) -> Self {
        Coupling::HopfToCusp {
            strength,
            b_from: 0.0,
        }
    }

    pub fn hopf_to_hopf(strength: f64) -> Self {
        Coupling::HopfToHopf {
            strength,
            b_from: 0.0,
            b_to: 0.0,
        }
    }

    pub fn kind(&self) -> CouplingKind {
        match self {
            Coupling::Linear { .. } => CouplingKind::Linear,
            Coupling::OffsetLinear { .. } => CouplingKind::OffsetLinear,
            Coupling::CuspToHopf { .. } => CouplingKind::CuspToHopf,
            Coupling::HopfToCusp { .. } => CouplingKind::HopfToCusp,
            Coupling::HopfToHopf { .. } => CouplingKind::HopfToHopf,
        }
    }

    pub fn strength(&self) -> f64 {
        match *self {
            Coupling::Linear { strength }
            | Coupling::OffsetLinear { strength, .. }
            | Coupling::CuspToHopf { strength, .. }
            | Coupling::HopfToCusp { strength, .. }
            | Coupling::HopfToHopf { strength, .. } => strength,
        }
    }

    /// Linear in `x_from` and independent of `t` and `x_to`.
    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            Coupling::Linear { .. } | Coupling::OffsetLinear { .. }
        )
    }

    /// Constant part and slope of a linear coupling, so that the term equals
    /// `offset + slope * x_from`.
    pub fn linear_form(&self) -> Option<(f64, f64)> {
        match *self {
            Coupling::Linear { strength } => Some((0.0, strength)),
            Coupling::OffsetLinear { strength, x_0 } => Some((-strength * x_0, strength)),
            _ => None,
        }
    }

    /// Checks endpoint kinds and refreshes constants taken from them.
    pub fn bind(&self, from: &Element, to: &Element, ids: (usize, usize)) -> Result<Coupling> {
        let hopf_from = matches!(from, Element::Hopf(_));
        let hopf_to = matches!(to, Element::Hopf(_));
        let bound = match (*self, from, to) {
            (Coupling::Linear { .. } | Coupling::OffsetLinear { .. }, _, _) => *self,
            (Coupling::CuspToHopf { strength, .. }, _, Element::Hopf(h)) if !hopf_from => {
                Coupling::CuspToHopf { strength, a_to: h.a }
            }
            (Coupling::HopfToCusp { strength, .. }, Element::Hopf(h), _) if !hopf_to => {
                Coupling::HopfToCusp {
                    strength,
                    b_from: h.b,
                }
            }
            (Coupling::HopfToHopf { strength, .. }, Element::Hopf(hf), Element::Hopf(ht)) => {
                Coupling::HopfToHopf {
                    strength,
                    b_from: hf.b,
                    b_to: ht.b,
                }
            }
            _ => {
                return Err(TippingError::IncompatibleCoupling {
                    from: ids.0,
                    to: ids.1,
                    coupling: self.kind(),
                    endpoints: (from.kind(), to.kind()),
                })
            }
        };
        Ok(bound)
    }
}

impl CouplingDynamics for Coupling {
    fn coupling(&self, t: f64, x_from: f64, x_to: f64) -> f64 {
        match *self {
            Coupling::Linear { strength } => strength * x_from,
            Coupling::OffsetLinear { strength, x_0 } => strength * (x_from - x_0),
            Coupling::CuspToHopf { strength, a_to } => a_to * x_to * strength * x_from,
            Coupling::HopfToCusp { strength, b_from } => strength * x_from * (b_from * t).cos(),
            Coupling::HopfToHopf {
                strength,
                b_from,
                b_to,
            } => strength * x_from * ((b_from - b_to) * t).cos(),
        }
    }

    fn d_from(&self, t: f64, _x_from: f64, x_to: f64) -> f64 {
        match *self {
            Coupling::Linear { strength } | Coupling::OffsetLinear { strength, .. } => strength,
            Coupling::CuspToHopf { strength, a_to } => a_to * x_to * strength,
            Coupling::HopfToCusp { strength, b_from } => strength * (b_from * t).cos(),
            Coupling::HopfToHopf {
                strength,
                b_from,
                b_to,
            } => strength * ((b_from - b_to) * t).cos(),
        }
    }

    fn d_to(&self, _t: f64, x_from: f64, _x_to: f64) -> f64 {
        match *self {
            Coupling::CuspToHopf { strength, a_to } => a_to * strength * x_from,
            _ => 0.0,
        }
    }
}

/// Kinds of endpoints each coupling accepts, for error messages.
pub(crate) fn describe(kind: CouplingKind) -> &'static str {
    match kind {
        CouplingKind::Linear | CouplingKind::OffsetLinear => "any -> any",
        CouplingKind::CuspToHopf => "cubic -> hopf",
        CouplingKind::HopfToCusp => "hopf -> cubic",
        CouplingKind::HopfToHopf => "hopf -> hopf",
    }
}

impl std::fmt::Display for CouplingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, describe(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_partials(c: &Coupling, t: f64, x_from: f64, x_to: f64) -> (f64, f64) {
        let h = 1e-6;
        let d_from = (c.coupling(t, x_from + h, x_to) - c.coupling(t, x_from - h, x_to)) / (2.0 * h);
        let d_to = (c.coupling(t, x_from, x_to + h) - c.coupling(t, x_from, x_to - h)) / (2.0 * h);
        (d_from, d_to)
    }

    #[test]
    fn linear_couplings() {
        let c = Coupling::linear(0.5);
        assert_eq!(c.coupling(3.0, 2.0, 7.0), 1.0);
        assert_eq!(c.d_from(3.0, 2.0, 7.0), 0.5);
        assert_eq!(c.d_to(3.0, 2.0, 7.0), 0.0);

        let c = Coupling::offset_linear(0.5, -1.0);
        assert_eq!(c.coupling(0.0, -1.0, 0.0), 0.0);
        assert_eq!(c.coupling(0.0, 1.0, 0.0), 1.0);
        assert_eq!(c.linear_form(), Some((0.5, 0.5)));
    }

    #[test]
    fn cross_type_partials_match_finite_differences() {
        let cusp = Element::cusp(-1.0, 1.0, 0.0, 0.0);
        let hopf = Element::hopf(2.0, 0.7, 0.5);
        let other = Element::hopf(1.0, 0.3, 0.5);
        let couplings = [
            Coupling::cusp_to_hopf(0.4).bind(&cusp, &hopf, (0, 1)).unwrap(),
            Coupling::hopf_to_cusp(0.4).bind(&hopf, &cusp, (1, 0)).unwrap(),
            Coupling::hopf_to_hopf(0.4).bind(&hopf, &other, (1, 2)).unwrap(),
        ];
        for c in couplings {
            let (t, x_from, x_to) = (1.3, 0.8, 0.6);
            let (d_from, d_to) = numeric_partials(&c, t, x_from, x_to);
            assert!((c.d_from(t, x_from, x_to) - d_from).abs() < 1e-8, "{c:?}");
            assert!((c.d_to(t, x_from, x_to) - d_to).abs() < 1e-8, "{c:?}");
        }
    }

    #[test]
    fn hopf_to_cusp_is_non_autonomous() {
        let hopf = Element::hopf(1.0, std::f64::consts::PI, 1.0);
        let cusp = Element::cusp(-1.0, 1.0, 0.0, 0.0);
        let c = Coupling::hopf_to_cusp(2.0).bind(&hopf, &cusp, (0, 1)).unwrap();
        assert!((c.coupling(0.0, 1.0, 0.0) - 2.0).abs() < 1e-12);
        assert!((c.coupling(1.0, 1.0, 0.0) + 2.0).abs() < 1e-12);
        assert!((c.coupling(0.5, 1.0, 0.0)).abs() < 1e-12);
        assert_eq!(c.d_to(0.5, 1.0, 0.0), 0.0);
    }

    #[test]
    fn bind_rejects_mismatched_endpoints() {
        let cusp = Element::cusp(-1.0, 1.0, 0.0, 0.0);
        let err = Coupling::hopf_to_cusp(1.0)
            .bind(&cusp, &cusp, (0, 1))
            .unwrap_err();
        assert!(matches!(err, TippingError::IncompatibleCoupling { from: 0, to: 1, .. }));
        assert!(Coupling::cusp_to_hopf(1.0).bind(&cusp, &cusp, (0, 1)).is_err());
        assert!(Coupling::linear(1.0).bind(&cusp, &cusp, (0, 1)).is_ok());
    }
}
