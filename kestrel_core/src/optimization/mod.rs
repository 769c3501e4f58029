// kestrel_core/src/optimization/mod.rs

//! The contract between the trajectory optimizer and a nonlinear programming
//! (NLP) solver.
//!
//! A problem is described by a scalar objective `f(x)` and a vector of
//! constraint functions `g(x)`, both written generically over [`Scalar`] so
//! they can be evaluated at plain `f64` values and at dual numbers for exact
//! first derivatives. The solver receives the problem, the variable and
//! constraint bounds, and an initial guess:
//!
//! ```text
//! minimize    f(x)
//! subject to  g_l <= g(x) <= g_u
//!             x_l <= x    <= x_u
//! ```

use nalgebra::DVector;
use num_dual::DualNum;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod differentiation;
pub mod sqp;

pub use sqp::{SqpOptions, SqpSolver};

/// Bound magnitude at or beyond which a bound is treated as absent.
pub const INFINITE_BOUND: f64 = 1.0e19;

/// The arithmetic a problem's objective and constraints are written against.
///
/// Any real-valued dual number over `f64` qualifies, `f64` itself included.
pub trait Scalar: DualNum<f64> + Copy + From<f64> {}

impl<T> Scalar for T where T: DualNum<f64> + Copy + From<f64> {}

/// A smooth nonlinear program.
pub trait NlpProblem {
    /// Length of the decision vector.
    fn num_variables(&self) -> usize;

    /// Number of rows in `g(x)`.
    fn num_constraints(&self) -> usize;

    /// Evaluates the objective `f(x)`.
    fn objective<T: Scalar>(&self, vars: &[T]) -> T;

    /// Evaluates every constraint row of `g(x)` into `out`, which has
    /// `num_constraints()` entries.
    fn constraints<T: Scalar>(&self, vars: &[T], out: &mut [T]);
}

/// Box bounds on the decision vector and on the constraint rows.
///
/// Rows whose lower and upper bounds coincide are equality constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub variables_lower: DVector<f64>,
    pub variables_upper: DVector<f64>,
    pub constraints_lower: DVector<f64>,
    pub constraints_upper: DVector<f64>,
}

impl Bounds {
    /// Unbounded variables and equality-to-zero constraints.
    pub fn unbounded(num_variables: usize, num_constraints: usize) -> Self {
        Self {
            variables_lower: DVector::from_element(num_variables, -INFINITE_BOUND),
            variables_upper: DVector::from_element(num_variables, INFINITE_BOUND),
            constraints_lower: DVector::zeros(num_constraints),
            constraints_upper: DVector::zeros(num_constraints),
        }
    }

    /// Checks lengths against `problem` and that every lower bound sits at or
    /// below its upper bound.
    pub fn is_consistent_with<P: NlpProblem>(&self, problem: &P) -> bool {
        let n = problem.num_variables();
        let m = problem.num_constraints();
        self.variables_lower.len() == n
            && self.variables_upper.len() == n
            && self.constraints_lower.len() == m
            && self.constraints_upper.len() == m
            && self
                .variables_lower
                .iter()
                .zip(self.variables_upper.iter())
                .chain(
                    self.constraints_lower
                        .iter()
                        .zip(self.constraints_upper.iter()),
                )
                .all(|(lo, hi)| !lo.is_nan() && !hi.is_nan() && lo <= hi)
    }
}

/// Why a solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverStatus {
    /// The optimality error fell below the requested tolerance.
    Success,
    /// The optimality error stayed below the acceptable tolerance for several
    /// consecutive iterations.
    SolvedToAcceptableLevel,
    MaximumIterationsExceeded,
    /// The wall-clock budget ran out.
    MaximumCpuTimeExceeded,
    /// No step length produced sufficient decrease of the merit function.
    LineSearchFailed,
    /// The Newton system could not be solved even after regularization.
    ErrorInStepComputation,
    /// The problem produced a NaN or infinite value.
    InvalidNumberDetected,
    /// Dimensions or bounds were inconsistent.
    InvalidProblemDefinition,
}

impl SolverStatus {
    /// True for the statuses whose iterate is a usable solution.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            SolverStatus::Success | SolverStatus::SolvedToAcceptableLevel
        )
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SolverStatus::Success => "success",
            SolverStatus::SolvedToAcceptableLevel => "solved to acceptable level",
            SolverStatus::MaximumIterationsExceeded => "maximum iterations exceeded",
            SolverStatus::MaximumCpuTimeExceeded => "maximum cpu time exceeded",
            SolverStatus::LineSearchFailed => "line search failed",
            SolverStatus::ErrorInStepComputation => "error in step computation",
            SolverStatus::InvalidNumberDetected => "invalid number detected",
            SolverStatus::InvalidProblemDefinition => "invalid problem definition",
        };
        f.write_str(text)
    }
}

/// A converged solve.
#[derive(Debug, Clone)]
pub struct NlpSolution {
    pub status: SolverStatus,
    /// The optimal decision vector.
    pub x: DVector<f64>,
    /// Objective value at `x`, unscaled.
    pub objective: f64,
    /// Constraint multipliers, one per row of `g(x)`.
    pub multipliers: DVector<f64>,
    pub iterations: usize,
}

/// A solve that did not produce a usable iterate.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("solver stopped with status {status} after {iterations} iterations")]
pub struct NlpFailure {
    pub status: SolverStatus,
    /// The last finite objective value seen, if any.
    pub objective: Option<f64>,
    pub iterations: usize,
}

/// Anything that can solve an [`NlpProblem`].
pub trait NlpSolver {
    fn solve<P: NlpProblem>(
        &self,
        problem: &P,
        bounds: &Bounds,
        initial_guess: &DVector<f64>,
    ) -> Result<NlpSolution, NlpFailure>;
}

/// True when `bound` is a real limit rather than the "no limit" sentinel.
pub(crate) fn is_finite_bound(bound: f64) -> bool {
    bound.is_finite() && bound.abs() < INFINITE_BOUND
}
