use crate::coupling::CouplingKind;
use crate::element::ElementKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TippingError {
    #[error("Node {id} does not exist (network has {len} nodes).")]
    UnknownNode { id: usize, len: usize },

    #[error("Coupling {from} -> {to} already exists.")]
    DuplicateCoupling { from: usize, to: usize },

    #[error("Coupling {coupling} cannot connect {from} ({}) -> {to} ({}).", .endpoints.0, .endpoints.1)]
    IncompatibleCoupling {
        from: usize,
        to: usize,
        coupling: CouplingKind,
        endpoints: (ElementKind, ElementKind),
    },

    #[error("Parameter '{key}' of a {kind} element is derived and cannot be set directly.")]
    DerivedParameter { kind: &'static str, key: String },

    #[error("Unknown parameter '{key}' for a {kind} element.")]
    UnknownParameter { kind: &'static str, key: String },

    #[error("State dimension mismatch. Expected {expected}, got {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("No equilibrium found in {elapsed:?}. Increase tolerance or time budget.")]
    NotConverged {
        elapsed: Duration,
        last_state: Vec<f64>,
    },

    #[error("State became non-finite at t = {time}. Reduce the step size or the noise amplitude.")]
    Diverged { time: f64, last_state: Vec<f64> },
}

impl TippingError {
    /// Numerical outcomes a caller can retry from with other settings or
    /// another seed; everything else is a configuration error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TippingError::NotConverged { .. } | TippingError::Diverged { .. }
        )
    }
}

pub type Result<T, E = TippingError> = std::result::Result<T, E>;

pub(crate) fn invalid(msg: impl Into<String>) -> TippingError {
    TippingError::InvalidSetting(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_numeric_failures_are_recoverable() {
        let err = TippingError::NotConverged {
            elapsed: Duration::from_millis(5),
            last_state: vec![0.0],
        };
        assert!(err.is_recoverable());
        let err = TippingError::Diverged {
            time: 0.15,
            last_state: vec![3.0],
        };
        assert!(err.is_recoverable());
        assert!(!TippingError::UnknownNode { id: 3, len: 2 }.is_recoverable());
        assert!(!invalid("dt must be positive").is_recoverable());
    }

    #[test]
    fn messages_name_the_offending_item() {
        let message = format!("{}", TippingError::DuplicateCoupling { from: 0, to: 1 });
        assert!(message.contains("0 -> 1"));
        let message = format!(
            "{}",
            TippingError::DerivedParameter {
                kind: "calibrated cusp",
                key: "c".into(),
            }
        );
        assert!(message.contains("'c'"));
    }
}
