// kestrel_core/src/path/polynomial.rs

use nalgebra::{DMatrix, DVector, Point2};
use serde::{Deserialize, Serialize};

use super::{FitError, REFERENCE_DEGREE};
use crate::optimization::Scalar;

/// Diagonal entries of `R` below this fraction of the largest one mark the
/// least-squares problem as rank deficient.
const RANK_TOLERANCE: f64 = 1.0e-9;

/// A polynomial in one variable, coefficients ordered from the constant term up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    /// Least-squares fit of a polynomial of `degree` through `points`.
    ///
    /// Solves the Vandermonde system through a QR decomposition rather than the
    /// normal equations, which would square its condition number.
    pub fn fit(points: &[Point2<f64>], degree: usize) -> Result<Self, FitError> {
        let required = degree + 1;
        if points.len() < required {
            return Err(FitError::InsufficientData {
                required,
                got: points.len(),
            });
        }
        if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(FitError::Singular);
        }

        let design = DMatrix::from_fn(points.len(), required, |row, col| {
            points[row].x.powi(col as i32)
        });
        let targets = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));

        let qr = design.qr();
        let r = qr.r();
        let diagonal = r.diagonal();
        let largest = diagonal.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        if largest == 0.0 || diagonal.iter().any(|d| d.abs() <= RANK_TOLERANCE * largest) {
            return Err(FitError::Singular);
        }

        let projected = qr.q().transpose() * targets;
        let solution = r
            .solve_upper_triangular(&projected)
            .ok_or(FitError::Singular)?;
        if solution.iter().any(|c| !c.is_finite()) {
            return Err(FitError::Singular);
        }

        Ok(Self::new(solution.iter().copied().collect()))
    }

    /// Fits the cubic used as the controller's reference path.
    pub fn fit_cubic(points: &[Point2<f64>]) -> Result<Self, FitError> {
        Self::fit(points, REFERENCE_DEGREE)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// `f(x)` by Horner's rule. Generic so the optimizer can evaluate it on
    /// dual numbers.
    pub fn evaluate<T: Scalar>(&self, x: T) -> T {
        self.coefficients
            .iter()
            .rev()
            .fold(T::zero(), |acc, &c| acc * x + T::from(c))
    }

    /// `f'(x)`.
    pub fn slope<T: Scalar>(&self, x: T) -> T {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(T::zero(), |acc, (power, &c)| acc * x + T::from(power as f64 * c))
    }

    /// Direction of the path tangent at `x`, `atan(f'(x))`.
    pub fn heading<T: Scalar>(&self, x: T) -> T {
        self.slope(x).atan()
    }

    /// `count` points on the curve, starting at `start` and stepping `spacing`
    /// along x. The iterator borrows the polynomial and can be cloned to walk
    /// the curve again.
    pub fn samples(
        &self,
        start: f64,
        spacing: f64,
        count: usize,
    ) -> impl ExactSizeIterator<Item = Point2<f64>> + Clone + '_ {
        (0..count).map(move |i| {
            let x = start + spacing * i as f64;
            Point2::new(x, self.evaluate(x))
        })
    }
}
