//! Node-local dynamics.
//!
//! Each element is a small parameter struct implementing [`LocalDynamics`];
//! [`Element`] is the tagged variant stored on network nodes. Parameters are
//! never mutated in place: [`Element::with_param`] returns a rebuilt element,
//! so evaluation always reflects the current parameters.

use crate::error::{invalid, Result, TippingError};
use crate::traits::LocalDynamics;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Cusp,
    CalibratedCusp,
    Hopf,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Cusp => "cusp",
            ElementKind::CalibratedCusp => "calibrated cusp",
            ElementKind::Hopf => "hopf",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cubic normal form `a(x - x_0)^3 + b(x - x_0) + c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cusp {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub x_0: f64,
}

impl Cusp {
    pub fn new(a: f64, b: f64, c: f64, x_0: f64) -> Self {
        Self { a, b, c, x_0 }
    }

    /// Width of the control interval over which the cubic is bistable,
    /// `2 sqrt(-4b^3 / (27a))`. NaN when the form has no fold pair.
    pub fn tipping_width(&self) -> f64 {
        2.0 * (-4.0 * self.b.powi(3) / (27.0 * self.a)).sqrt()
    }
}

impl LocalDynamics for Cusp {
    fn rate(&self, _t: f64, x: f64) -> f64 {
        let u = x - self.x_0;
        self.a * u * u * u + self.b * u + self.c
    }

    fn d_rate(&self, _t: f64, x: f64) -> f64 {
        let u = x - self.x_0;
        3.0 * self.a * u * u + self.b
    }

    fn is_tipped(&self, x: f64) -> bool {
        x > self.x_0
    }
}

/// Polar amplitude form of a supercritical Hopf normal form,
/// `dr/dt = (c - r^2) r a`, with the phase rotating at angular velocity `b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hopf {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Hopf {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Phase angle of the oscillation at time `t`.
    pub fn phase(&self, t: f64) -> f64 {
        self.b * t
    }
}

impl LocalDynamics for Hopf {
    fn rate(&self, _t: f64, r: f64) -> f64 {
        (self.c - r * r) * r * self.a
    }

    fn d_rate(&self, _t: f64, r: f64) -> f64 {
        self.a * self.c - 3.0 * self.a * r * r
    }

    fn is_tipped(&self, _r: f64) -> bool {
        self.c > 0.0
    }
}

/// User-facing description of a calibrated cubic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Characteristic relaxation time of the element.
    pub timescale: f64,
    /// State values of the untipped and tipped stable branches at `c = 0`.
    pub states: (f64, f64),
    /// Control values bounding the bistable range.
    pub bistable_range: (f64, f64),
    pub rho: f64,
}

/// Cubic element controlled by a "distance to threshold" `rho`.
///
/// `rho` at the lower (upper) end of the bistable range puts `c` exactly on
/// the fold that destroys the tipped (untipped) branch. `c` is derived and
/// cannot be set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "Calibration", try_from = "Calibration")]
pub struct CalibratedCusp {
    calibration: Calibration,
    cubic: Cusp,
    direction: f64,
}

impl CalibratedCusp {
    pub fn new(
        timescale: f64,
        states: (f64, f64),
        bistable_range: (f64, f64),
        rho: f64,
    ) -> Result<Self> {
        Self::from_calibration(Calibration {
            timescale,
            states,
            bistable_range,
            rho,
        })
    }

    pub fn from_calibration(calibration: Calibration) -> Result<Self> {
        let Calibration {
            timescale,
            states: (x_untipped, x_tipped),
            bistable_range: (lower, upper),
            rho,
        } = calibration;
        if !(timescale > 0.0) {
            return Err(invalid("calibrated cusp timescale must be positive"));
        }
        if x_untipped == x_tipped || !x_untipped.is_finite() || !x_tipped.is_finite() {
            return Err(invalid("calibrated cusp needs two distinct finite states"));
        }
        if !(upper > lower) {
            return Err(invalid("calibrated cusp bistable range must be increasing"));
        }

        let half = 0.5 * (x_tipped - x_untipped).abs();
        let x_0 = 0.5 * (x_untipped + x_tipped);
        let a = -1.0 / (timescale * half * half);
        let b = 1.0 / timescale;
        let direction = if x_tipped > x_untipped { 1.0 } else { -1.0 };

        let mut cubic = Cusp::new(a, b, 0.0, x_0);
        let width = cubic.tipping_width();
        let mid = 0.5 * (lower + upper);
        cubic.c = direction * width * (rho - mid) / (upper - lower);

        Ok(Self {
            calibration,
            cubic,
            direction,
        })
    }

    pub fn rho(&self) -> f64 {
        self.calibration.rho
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Equivalent plain cubic with the derived `c`.
    pub fn cubic(&self) -> Cusp {
        self.cubic
    }

    pub fn with_rho(&self, rho: f64) -> Result<Self> {
        Self::from_calibration(Calibration {
            rho,
            ..self.calibration
        })
    }
}

impl From<CalibratedCusp> for Calibration {
    fn from(value: CalibratedCusp) -> Self {
        value.calibration
    }
}

impl TryFrom<Calibration> for CalibratedCusp {
    type Error = TippingError;

    fn try_from(value: Calibration) -> Result<Self> {
        CalibratedCusp::from_calibration(value)
    }
}

impl LocalDynamics for CalibratedCusp {
    fn rate(&self, t: f64, x: f64) -> f64 {
        self.cubic.rate(t, x)
    }

    fn d_rate(&self, t: f64, x: f64) -> f64 {
        self.cubic.d_rate(t, x)
    }

    fn is_tipped(&self, x: f64) -> bool {
        (x - self.cubic.x_0) * self.direction > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Cusp(Cusp),
    CalibratedCusp(CalibratedCusp),
    Hopf(Hopf),
}

impl Element {
    pub fn cusp(a: f64, b: f64, c: f64, x_0: f64) -> Self {
        Element::Cusp(Cusp::new(a, b, c, x_0))
    }

    pub fn hopf(a: f64, b: f64, c: f64) -> Self {
        Element::Hopf(Hopf::new(a, b, c))
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Cusp(_) => ElementKind::Cusp,
            Element::CalibratedCusp(_) => ElementKind::CalibratedCusp,
            Element::Hopf(_) => ElementKind::Hopf,
        }
    }

    /// Name of the parameter a cascade ratchet pushes upward.
    pub fn control_key(&self) -> &'static str {
        match self {
            Element::CalibratedCusp(_) => "rho",
            Element::Cusp(_) | Element::Hopf(_) => "c",
        }
    }

    pub fn control(&self) -> f64 {
        match self {
            Element::Cusp(e) => e.c,
            Element::CalibratedCusp(e) => e.rho(),
            Element::Hopf(e) => e.c,
        }
    }

    /// The effective cubic form, for elements that have one.
    pub fn cubic_form(&self) -> Option<Cusp> {
        match self {
            Element::Cusp(e) => Some(*e),
            Element::CalibratedCusp(e) => Some(e.cubic()),
            Element::Hopf(_) => None,
        }
    }

    pub fn get_param(&self, key: &str) -> Result<f64> {
        let value = match (self, key) {
            (Element::Cusp(e), "a") => e.a,
            (Element::Cusp(e), "b") => e.b,
            (Element::Cusp(e), "c") => e.c,
            (Element::Cusp(e), "x_0") => e.x_0,
            (Element::CalibratedCusp(e), "rho") => e.rho(),
            (Element::CalibratedCusp(e), "timescale") => e.calibration().timescale,
            (Element::CalibratedCusp(e), "a") => e.cubic().a,
            (Element::CalibratedCusp(e), "b") => e.cubic().b,
            (Element::CalibratedCusp(e), "c") => e.cubic().c,
            (Element::CalibratedCusp(e), "x_0") => e.cubic().x_0,
            (Element::Hopf(e), "a") => e.a,
            (Element::Hopf(e), "b") => e.b,
            (Element::Hopf(e), "c") => e.c,
            _ => return Err(self.unknown(key)),
        };
        Ok(value)
    }

    /// Returns a copy of this element with `key` set to `value`.
    pub fn with_param(&self, key: &str, value: f64) -> Result<Element> {
        let mut next = *self;
        match (&mut next, key) {
            (Element::Cusp(e), "a") => e.a = value,
            (Element::Cusp(e), "b") => e.b = value,
            (Element::Cusp(e), "c") => e.c = value,
            (Element::Cusp(e), "x_0") => e.x_0 = value,
            (Element::CalibratedCusp(e), "rho") => *e = e.with_rho(value)?,
            (Element::CalibratedCusp(_), "a" | "b" | "c" | "x_0" | "timescale") => {
                return Err(TippingError::DerivedParameter {
                    kind: self.kind().name(),
                    key: key.to_string(),
                })
            }
            (Element::Hopf(e), "a") => e.a = value,
            (Element::Hopf(e), "b") => e.b = value,
            (Element::Hopf(e), "c") => e.c = value,
            _ => return Err(self.unknown(key)),
        }
        Ok(next)
    }

    pub fn with_control(&self, value: f64) -> Result<Element> {
        self.with_param(self.control_key(), value)
    }

    fn unknown(&self, key: &str) -> TippingError {
        TippingError::UnknownParameter {
            kind: self.kind().name(),
            key: key.to_string(),
        }
    }
}

impl From<Cusp> for Element {
    fn from(value: Cusp) -> Self {
        Element::Cusp(value)
    }
}

impl From<CalibratedCusp> for Element {
    fn from(value: CalibratedCusp) -> Self {
        Element::CalibratedCusp(value)
    }
}

impl From<Hopf> for Element {
    fn from(value: Hopf) -> Self {
        Element::Hopf(value)
    }
}

impl LocalDynamics for Element {
    fn rate(&self, t: f64, x: f64) -> f64 {
        match self {
            Element::Cusp(e) => e.rate(t, x),
            Element::CalibratedCusp(e) => e.rate(t, x),
            Element::Hopf(e) => e.rate(t, x),
        }
    }

    fn d_rate(&self, t: f64, x: f64) -> f64 {
        match self {
            Element::Cusp(e) => e.d_rate(t, x),
            Element::CalibratedCusp(e) => e.d_rate(t, x),
            Element::Hopf(e) => e.d_rate(t, x),
        }
    }

    fn is_tipped(&self, x: f64) -> bool {
        match self {
            Element::Cusp(e) => e.is_tipped(x),
            Element::CalibratedCusp(e) => e.is_tipped(x),
            Element::Hopf(e) => e.is_tipped(x),
        }
    }
}
