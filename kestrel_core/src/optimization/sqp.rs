// kestrel_core/src/optimization/sqp.rs

//! Sequential quadratic programming with Clarabel as the QP engine.
//!
//! Every iteration linearizes the constraints with dual numbers, builds the
//! exact Lagrangian Hessian with hyper-dual numbers (eigenvalues modified
//! until positive definite), and lets Clarabel compute the step `d` of
//!
//! ```text
//! minimize    1/2 d^T H d + grad f^T d
//! subject to  g_l <= g(x) + J d <= g_u
//!             x_l <= x + d    <= x_u
//!             |d_i| <= max_step
//! ```
//!
//! Steps are accepted by backtracking on an l1 merit function, with one
//! second-order correction tried whenever the full step is rejected.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus as QpStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

use super::differentiation::{evaluate_derivatives, evaluate_values, lagrangian_hessian};
use super::{
    is_finite_bound, Bounds, NlpFailure, NlpProblem, NlpSolution, NlpSolver, SolverStatus,
};

const ARMIJO_ETA: f64 = 1.0e-4;
const MAX_BACKTRACKS: usize = 30;
// The merit penalty stays at least this multiple of the largest multiplier.
const PENALTY_FACTOR: f64 = 2.0;
// Smallest eigenvalue kept in the QP Hessian, relative to its largest entry.
const HESSIAN_FLOOR: f64 = 1.0e-8;

/// Tuning knobs for [`SqpSolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqpOptions {
    pub max_iterations: usize,
    /// Converged once both the step and the constraint violation fall below this.
    pub tolerance: f64,
    /// Looser tolerance accepted after `acceptable_iterations` consecutive hits.
    pub acceptable_tolerance: f64,
    pub acceptable_iterations: usize,
    /// Wall-clock budget for one solve, in seconds.
    pub max_cpu_time: f64,
    /// Largest change of any single variable in one step.
    pub max_step: f64,
    /// Iteration cap handed to Clarabel for each QP.
    pub qp_max_iterations: u32,
}

impl Default for SqpOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1.0e-6,
            acceptable_tolerance: 1.0e-4,
            acceptable_iterations: 3,
            max_cpu_time: 0.5,
            max_step: 100.0,
            qp_max_iterations: 100,
        }
    }
}

impl SqpOptions {
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("tolerance", self.tolerance),
            ("acceptable_tolerance", self.acceptable_tolerance),
            ("max_cpu_time", self.max_cpu_time),
            ("max_step", self.max_step),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("solver.{name} must be positive and finite, got {value}"));
            }
        }
        if self.acceptable_tolerance < self.tolerance {
            return Err("solver.acceptable_tolerance must be at least solver.tolerance".to_string());
        }
        if self.qp_max_iterations == 0 {
            return Err("solver.qp_max_iterations must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Dense SQP solver with exact second derivatives.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    options: SqpOptions,
}

impl SqpSolver {
    pub fn new(options: SqpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SqpOptions {
        &self.options
    }
}

impl NlpSolver for SqpSolver {
    fn solve<P: NlpProblem>(
        &self,
        problem: &P,
        bounds: &Bounds,
        initial_guess: &DVector<f64>,
    ) -> Result<NlpSolution, NlpFailure> {
        let started = Instant::now();
        let options = &self.options;

        let n = problem.num_variables();
        if n == 0 || initial_guess.len() != n || !bounds.is_consistent_with(problem) {
            return Err(failure(SolverStatus::InvalidProblemDefinition, None, 0));
        }
        if initial_guess.iter().any(|v| !v.is_finite()) {
            return Err(failure(SolverStatus::InvalidNumberDetected, None, 0));
        }

        let mut x = initial_guess.zip_zip_map(
            &bounds.variables_lower,
            &bounds.variables_upper,
            |v, lo, hi| v.clamp(lo, hi),
        );
        let mut lambda = DVector::zeros(problem.num_constraints());
        let mut penalty = 1.0;
        let mut acceptable_streak = 0;
        let mut iteration = 0;

        loop {
            let point = evaluate_derivatives(problem, &x);
            let objective = point.values.objective;
            if !(objective.is_finite()
                && point.values.constraints.iter().all(|v| v.is_finite())
                && point.gradient.iter().all(|v| v.is_finite())
                && point.jacobian.iter().all(|v| v.is_finite()))
            {
                return Err(failure(SolverStatus::InvalidNumberDetected, Some(objective), iteration));
            }

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed >= options.max_cpu_time {
                return Err(failure(SolverStatus::MaximumCpuTimeExceeded, Some(objective), iteration));
            }
            if iteration >= options.max_iterations {
                return Err(failure(
                    SolverStatus::MaximumIterationsExceeded,
                    Some(objective),
                    iteration,
                ));
            }

            let Some(hessian) = convexify(lagrangian_hessian(problem, &x, &lambda)) else {
                return Err(failure(SolverStatus::ErrorInStepComputation, Some(objective), iteration));
            };
            let subproblem = StepProblem {
                hessian: &hessian,
                gradient: &point.gradient,
                jacobian: &point.jacobian,
                bounds,
                options,
            };
            let time_left = options.max_cpu_time - elapsed;
            let qp = subproblem
                .solve(&x, &point.values.constraints, time_left)
                .map_err(|status| failure(status, Some(objective), iteration))?;
            iteration += 1;

            let current = violation(&point.values.constraints, bounds);
            let step_norm = qp.step.amax();
            let scale = 1.0 + x.amax();
            trace!(
                iteration,
                objective,
                violation = current.max,
                step = step_norm,
                penalty,
                "sqp iteration"
            );

            if step_norm <= options.tolerance * scale && current.max <= options.tolerance {
                debug!(iteration, objective, "sqp converged");
                return Ok(solution(SolverStatus::Success, x, objective, qp.multipliers, iteration));
            }
            let acceptable = step_norm <= options.acceptable_tolerance * scale
                && current.max <= options.acceptable_tolerance;
            if acceptable {
                acceptable_streak += 1;
                if acceptable_streak >= options.acceptable_iterations {
                    return Ok(solution(
                        SolverStatus::SolvedToAcceptableLevel,
                        x,
                        objective,
                        qp.multipliers,
                        iteration,
                    ));
                }
            } else {
                acceptable_streak = 0;
            }

            penalty = f64::max(penalty, PENALTY_FACTOR * qp.multipliers.amax());
            let merit = |values: &super::differentiation::Values| {
                values.objective + penalty * violation(&values.constraints, bounds).total
            };
            let current_merit = objective + penalty * current.total;
            let slope = (point.gradient.dot(&qp.step) - penalty * current.total).min(0.0);
            let sufficient = |trial: f64, alpha: f64| {
                trial.is_finite() && trial <= current_merit + ARMIJO_ETA * alpha * slope
            };

            let full = &x + &qp.step;
            let full_values = evaluate_values(problem, &full);
            let mut accepted = sufficient(merit(&full_values), 1.0).then_some(full);

            if accepted.is_none() {
                // Second-order correction: re-solve with the constraint
                // curvature seen along the full step.
                let shifted = &full_values.constraints - &point.jacobian * &qp.step;
                if shifted.iter().all(|v| v.is_finite()) {
                    let time_left = options.max_cpu_time - started.elapsed().as_secs_f64();
                    if let Ok(correction) = subproblem.solve(&x, &shifted, time_left) {
                        let corrected = &x + &correction.step;
                        if sufficient(merit(&evaluate_values(problem, &corrected)), 1.0) {
                            accepted = Some(corrected);
                        }
                    }
                }
            }

            let mut alpha = 0.5;
            for _ in 0..MAX_BACKTRACKS {
                if accepted.is_some() {
                    break;
                }
                let trial = &x + &qp.step * alpha;
                if sufficient(merit(&evaluate_values(problem, &trial)), alpha) {
                    accepted = Some(trial);
                }
                alpha *= 0.5;
            }

            match accepted {
                Some(next) => x = next,
                None if acceptable => {
                    return Ok(solution(
                        SolverStatus::SolvedToAcceptableLevel,
                        x,
                        objective,
                        qp.multipliers,
                        iteration,
                    ));
                }
                None => {
                    return Err(failure(SolverStatus::LineSearchFailed, Some(objective), iteration));
                }
            }
            lambda = qp.multipliers;
        }
    }
}

fn failure(status: SolverStatus, objective: Option<f64>, iterations: usize) -> NlpFailure {
    NlpFailure {
        status,
        objective: objective.filter(|f| f.is_finite()),
        iterations,
    }
}

fn solution(
    status: SolverStatus,
    x: DVector<f64>,
    objective: f64,
    multipliers: DVector<f64>,
    iterations: usize,
) -> NlpSolution {
    NlpSolution {
        status,
        x,
        objective,
        multipliers,
        iterations,
    }
}

/// Makes `hessian` positive definite by flipping negative eigenvalues and
/// flooring small ones. Already well-conditioned matrices pass unchanged.
fn convexify(hessian: DMatrix<f64>) -> Option<DMatrix<f64>> {
    if hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let floor = HESSIAN_FLOOR * hessian.amax().max(1.0);
    let mut eigen = hessian.clone().symmetric_eigen();
    if eigen.eigenvalues.iter().all(|&l| l >= floor) {
        return Some(hessian);
    }
    eigen.eigenvalues.apply(|l| *l = l.abs().max(floor));
    Some(eigen.recompose())
}

/// Total and largest amount by which `g` leaves its row bounds.
struct Violation {
    total: f64,
    max: f64,
}

fn violation(constraints: &DVector<f64>, bounds: &Bounds) -> Violation {
    let mut total = 0.0;
    let mut max: f64 = 0.0;
    for (i, &g) in constraints.iter().enumerate() {
        let lo = bounds.constraints_lower[i];
        let hi = bounds.constraints_upper[i];
        let below = if is_finite_bound(lo) { (lo - g).max(0.0) } else { 0.0 };
        let above = if is_finite_bound(hi) { (g - hi).max(0.0) } else { 0.0 };
        total += below + above;
        max = max.max(below).max(above);
    }
    Violation { total, max }
}

// --- QP subproblem ---

/// Where a QP row's coefficients come from.
#[derive(Debug, Clone, Copy)]
enum RowSource {
    /// A row of the constraint Jacobian.
    Constraint(usize),
    /// A unit row selecting one variable.
    Variable(usize),
}

/// One row `sign * a^T d + s = rhs` of the Clarabel problem.
#[derive(Debug, Clone, Copy)]
struct QpRow {
    source: RowSource,
    sign: f64,
    rhs: f64,
}

struct QpStep {
    step: DVector<f64>,
    /// Multipliers of `g(x)` with `grad f + J^T multipliers = 0` at a solution.
    multipliers: DVector<f64>,
}

/// The parts of one SQP iteration's QP that stay fixed across the
/// second-order correction.
struct StepProblem<'a> {
    hessian: &'a DMatrix<f64>,
    gradient: &'a DVector<f64>,
    jacobian: &'a DMatrix<f64>,
    bounds: &'a Bounds,
    options: &'a SqpOptions,
}

impl StepProblem<'_> {
    /// Solves the QP with `constraints` as the constant term of the
    /// linearized rows.
    fn solve(
        &self,
        x: &DVector<f64>,
        constraints: &DVector<f64>,
        time_left: f64,
    ) -> Result<QpStep, SolverStatus> {
        if time_left <= 0.0 {
            return Err(SolverStatus::MaximumCpuTimeExceeded);
        }
        let (equalities, inequalities) = self.rows(x, constraints);
        let rows: Vec<QpRow> = equalities.iter().chain(inequalities.iter()).copied().collect();

        let n = x.len();
        let mut a = DMatrix::zeros(rows.len(), n);
        for (r, row) in rows.iter().enumerate() {
            match row.source {
                RowSource::Constraint(i) => {
                    for j in 0..n {
                        a[(r, j)] = row.sign * self.jacobian[(i, j)];
                    }
                }
                RowSource::Variable(j) => a[(r, j)] = row.sign,
            }
        }
        let b: Vec<f64> = rows.iter().map(|row| row.rhs).collect();
        let q: Vec<f64> = self.gradient.iter().copied().collect();

        let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
        if !equalities.is_empty() {
            cones.push(ZeroConeT(equalities.len()));
        }
        if !inequalities.is_empty() {
            cones.push(NonnegativeConeT(inequalities.len()));
        }

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.options.qp_max_iterations)
            .time_limit(time_left)
            .verbose(false)
            .build()
            .map_err(|_| SolverStatus::InvalidProblemDefinition)?;

        let p = upper_triangle_to_csc(self.hessian);
        let a = dense_to_csc(&a);
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings)
            .map_err(|_| SolverStatus::InvalidProblemDefinition)?;
        solver.solve();

        let result = &solver.solution;
        match result.status {
            QpStatus::Solved | QpStatus::AlmostSolved => {}
            QpStatus::MaxTime => return Err(SolverStatus::MaximumCpuTimeExceeded),
            _ => return Err(SolverStatus::ErrorInStepComputation),
        }

        let step = DVector::from_column_slice(&result.x);
        if step.iter().any(|v| !v.is_finite()) {
            return Err(SolverStatus::InvalidNumberDetected);
        }
        let mut multipliers = DVector::zeros(constraints.len());
        for (row, z) in rows.iter().zip(result.z.iter()) {
            if let RowSource::Constraint(i) = row.source {
                multipliers[i] += row.sign * z;
            }
        }
        Ok(QpStep { step, multipliers })
    }

    /// Splits the QP rows into equalities (zero cone) and inequalities
    /// (nonnegative cone).
    fn rows(&self, x: &DVector<f64>, constraints: &DVector<f64>) -> (Vec<QpRow>, Vec<QpRow>) {
        let bounds = self.bounds;
        let max_step = self.options.max_step;
        let mut equalities = Vec::new();
        let mut inequalities = Vec::new();

        for (i, &g) in constraints.iter().enumerate() {
            let source = RowSource::Constraint(i);
            let (lo, hi) = (bounds.constraints_lower[i], bounds.constraints_upper[i]);
            if lo == hi {
                equalities.push(QpRow { source, sign: 1.0, rhs: lo - g });
                continue;
            }
            if is_finite_bound(lo) {
                inequalities.push(QpRow { source, sign: -1.0, rhs: g - lo });
            }
            if is_finite_bound(hi) {
                inequalities.push(QpRow { source, sign: 1.0, rhs: hi - g });
            }
        }

        for (j, &xj) in x.iter().enumerate() {
            let source = RowSource::Variable(j);
            let (lo, hi) = (bounds.variables_lower[j], bounds.variables_upper[j]);
            if lo == hi {
                equalities.push(QpRow { source, sign: 1.0, rhs: lo - xj });
                continue;
            }
            let down = if is_finite_bound(lo) { (xj - lo).min(max_step) } else { max_step };
            let up = if is_finite_bound(hi) { (hi - xj).min(max_step) } else { max_step };
            inequalities.push(QpRow { source, sign: -1.0, rhs: down.max(0.0) });
            inequalities.push(QpRow { source, sign: 1.0, rhs: up.max(0.0) });
        }

        (equalities, inequalities)
    }
}

/// Converts a dense matrix into Clarabel's compressed sparse column format.
fn dense_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// The upper triangle of a symmetric matrix, as Clarabel expects `P`.
fn upper_triangle_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
