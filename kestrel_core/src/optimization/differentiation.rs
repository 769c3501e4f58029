// kestrel_core/src/optimization/differentiation.rs

//! Forward-mode evaluation of an [`NlpProblem`]'s derivatives with dual numbers.

use nalgebra::{DMatrix, DVector};
use num_dual::{Dual64, HyperDual64};

use super::NlpProblem;

/// Objective and constraint values at one point.
#[derive(Debug, Clone)]
pub struct Values {
    pub objective: f64,
    pub constraints: DVector<f64>,
}

/// Values plus the objective gradient and constraint Jacobian at one point.
#[derive(Debug, Clone)]
pub struct Derivatives {
    pub values: Values,
    pub gradient: DVector<f64>,
    /// `num_constraints x num_variables`.
    pub jacobian: DMatrix<f64>,
}

/// Evaluates `f(x)` and `g(x)` with plain floats.
pub fn evaluate_values<P: NlpProblem>(problem: &P, x: &DVector<f64>) -> Values {
    let mut constraints = vec![0.0; problem.num_constraints()];
    let objective = problem.objective(x.as_slice());
    problem.constraints(x.as_slice(), &mut constraints);
    Values {
        objective,
        constraints: DVector::from_vec(constraints),
    }
}

/// Evaluates `f(x)`, `g(x)`, `grad f(x)` and `dg/dx` by seeding one dual
/// direction per variable.
///
/// Costs `num_variables` passes through the problem, which is cheap for the
/// short horizons a receding-horizon controller uses.
pub fn evaluate_derivatives<P: NlpProblem>(problem: &P, x: &DVector<f64>) -> Derivatives {
    let n = problem.num_variables();
    let m = problem.num_constraints();

    let mut duals: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
    let mut rows = vec![Dual64::from(0.0); m];
    let mut gradient = DVector::zeros(n);
    let mut jacobian = DMatrix::zeros(m, n);

    for j in 0..n {
        duals[j].eps = 1.0;
        let objective = problem.objective(&duals);
        problem.constraints(&duals, &mut rows);
        duals[j].eps = 0.0;

        gradient[j] = objective.eps;
        for (i, row) in rows.iter().enumerate() {
            jacobian[(i, j)] = row.eps;
        }
    }

    Derivatives {
        values: evaluate_values(problem, x),
        gradient,
        jacobian,
    }
}

/// Exact Hessian of the Lagrangian `f(x) + multipliers^T g(x)`, one
/// hyper-dual pass per upper-triangle entry. Constraint rows are skipped while
/// every multiplier is zero.
pub fn lagrangian_hessian<P: NlpProblem>(
    problem: &P,
    x: &DVector<f64>,
    multipliers: &DVector<f64>,
) -> DMatrix<f64> {
    let n = problem.num_variables();
    let with_constraints = multipliers.iter().any(|&l| l != 0.0);
    let mut duals: Vec<HyperDual64> = x.iter().map(|&v| HyperDual64::from(v)).collect();
    let mut rows = vec![HyperDual64::from(0.0); problem.num_constraints()];
    let mut hessian = DMatrix::zeros(n, n);

    for i in 0..n {
        duals[i].eps1 = 1.0;
        for j in i..n {
            duals[j].eps2 = 1.0;
            let mut second = problem.objective(&duals).eps1eps2;
            if with_constraints {
                problem.constraints(&duals, &mut rows);
                second += rows
                    .iter()
                    .zip(multipliers.iter())
                    .map(|(row, l)| l * row.eps1eps2)
                    .sum::<f64>();
            }
            duals[j].eps2 = 0.0;
            hessian[(i, j)] = second;
            hessian[(j, i)] = second;
        }
        duals[i].eps1 = 0.0;
    }
    hessian
}
