// kestrel_sim/src/simulation/integrators.rs

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// One step of an explicit ODE solver for `x' = func(x, t)`.
pub trait Integrator {
    fn step(
        &self,
        func: &dyn Fn(&DVector<f64>, f64) -> DVector<f64>,
        x0: &DVector<f64>,
        t0: f64,
        tf: f64,
    ) -> DVector<f64>;
}

// Runge-Kutta methods
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl Integrator for Euler {
    fn step(
        &self,
        func: &dyn Fn(&DVector<f64>, f64) -> DVector<f64>,
        x0: &DVector<f64>,
        t0: f64,
        tf: f64,
    ) -> DVector<f64> {
        let dt = tf - t0;
        x0 + func(x0, t0) * dt
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl Integrator for Rk4 {
    fn step(
        &self,
        func: &dyn Fn(&DVector<f64>, f64) -> DVector<f64>,
        x0: &DVector<f64>,
        t0: f64,
        tf: f64,
    ) -> DVector<f64> {
        let dt = tf - t0;
        let half = 0.5 * dt;

        let k1 = func(x0, t0);
        let k2 = func(&(x0 + &k1 * half), t0 + half);
        let k3 = func(&(x0 + &k2 * half), t0 + half);
        let k4 = func(&(x0 + &k3 * dt), tf);

        x0 + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
    }
}

/// Integrator selection as written in a scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Euler,
    #[default]
    Rk4,
}

impl IntegratorKind {
    pub fn build(self) -> Box<dyn Integrator> {
        match self {
            IntegratorKind::Euler => Box::new(Euler),
            IntegratorKind::Rk4 => Box::new(Rk4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn decay(x: &DVector<f64>, _t: f64) -> DVector<f64> {
        -x
    }

    fn integrate(integrator: &dyn Integrator, steps: usize) -> f64 {
        let dt = 1.0 / steps as f64;
        let mut x = DVector::from_element(1, 1.0);
        for i in 0..steps {
            x = integrator.step(&decay, &x, i as f64 * dt, (i + 1) as f64 * dt);
        }
        x[0]
    }

    #[test]
    fn test_rk4_matches_exponential_decay() {
        let exact = (-1.0_f64).exp();
        assert_relative_eq!(integrate(&Rk4, 20), exact, epsilon = 1e-7);
    }

    #[test]
    fn test_euler_is_first_order() {
        let exact = (-1.0_f64).exp();
        let coarse = (integrate(&Euler, 50) - exact).abs();
        let fine = (integrate(&Euler, 100) - exact).abs();
        // Halving the step roughly halves the error.
        assert_relative_eq!(coarse / fine, 2.0, epsilon = 0.1);
        // RK4 on the coarse grid beats Euler on the fine one.
        assert!((integrate(&Rk4, 50) - exact).abs() < fine);
    }

    #[test]
    fn test_kind_builds_matching_integrator() {
        let x = DVector::from_element(1, 1.0);
        let euler = IntegratorKind::Euler.build().step(&decay, &x, 0.0, 0.5);
        assert_relative_eq!(euler[0], 0.5);
        let rk4 = IntegratorKind::Rk4.build().step(&decay, &x, 0.0, 0.5);
        assert_relative_eq!(rk4[0], (-0.5_f64).exp(), epsilon = 1e-3);
    }
}
