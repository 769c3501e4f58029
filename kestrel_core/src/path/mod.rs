// kestrel_core/src/path/mod.rs

//! The local reference path: a polynomial `y = f(x)` fitted through the
//! waypoints after they have been moved into the vehicle frame.

use thiserror::Error;

pub mod polynomial;

pub use polynomial::Polynomial;

/// Degree of the reference polynomial. Cubic is enough for gentle curvature
/// without chasing noise in the waypoints.
pub const REFERENCE_DEGREE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FitError {
    #[error("the fit needs at least {required} points, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("the design matrix is rank deficient")]
    Singular,
}
