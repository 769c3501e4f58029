// kestrel_core/src/error.rs

use thiserror::Error;

use crate::optimization::SolverStatus;
use crate::path::FitError;

/// Everything that can stop a single control cycle.
///
/// All variants are local to one cycle: the caller can skip the cycle or hold
/// its previous command, then retry with fresh telemetry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MpcError {
    #[error("at least {required} waypoints are needed to fit the reference path, got {got}")]
    InsufficientWaypoints { required: usize, got: usize },

    #[error("waypoint sequences differ in length ({xs} x values, {ys} y values)")]
    MismatchedWaypoints { xs: usize, ys: usize },

    #[error("reference path fit is rank deficient (duplicate or degenerate waypoints)")]
    SingularFit,

    /// The solver gave up. `cost` is the last finite objective it reported, if any.
    /// A failed solve never doubles as a zero command.
    #[error("trajectory optimization failed with status {status} after {iterations} iterations")]
    SolveFailed {
        status: SolverStatus,
        cost: Option<f64>,
        iterations: usize,
    },

    #[error("invalid controller configuration: {0}")]
    InvalidConfig(String),
}

impl From<FitError> for MpcError {
    fn from(err: FitError) -> Self {
        match err {
            FitError::InsufficientData { required, got } => {
                MpcError::InsufficientWaypoints { required, got }
            }
            FitError::Singular => MpcError::SingularFit,
        }
    }
}
