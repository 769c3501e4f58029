// kestrel_core/src/models/kinematic_bicycle.rs

use serde::{Deserialize, Serialize};

use crate::optimization::Scalar;
use crate::path::Polynomial;
use crate::types::{ControlAction, VehicleState};

/// Discrete kinematic bicycle model.
///
/// Heading changes at `v * delta / lf`, where `lf` is the distance from the
/// front axle to the center of gravity. Both steps are generic so the same
/// equations serve latency projection on `f64` and the optimizer's dynamics
/// constraints on dual numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicBicycle {
    /// Front axle to center of gravity (m).
    pub lf: f64,
}

impl KinematicBicycle {
    pub fn new(lf: f64) -> Self {
        Self { lf }
    }

    /// Heading change over `dt` for speed `v` and steering `delta`.
    fn turn<T: Scalar>(&self, v: T, delta: T, dt: T) -> T {
        v * delta / T::from(self.lf) * dt
    }

    /// Advances every state variable by `dt`, including the tracking errors,
    /// which evolve from their own current values.
    pub fn propagate<T: Scalar>(
        &self,
        state: &VehicleState<T>,
        action: &ControlAction<T>,
        dt: f64,
    ) -> VehicleState<T> {
        let dt = T::from(dt);
        let turn = self.turn(state.v, action.steering, dt);
        VehicleState {
            x: state.x + state.v * state.psi.cos() * dt,
            y: state.y + state.v * state.psi.sin() * dt,
            psi: state.psi + turn,
            v: state.v + action.acceleration * dt,
            cte: state.cte + state.v * state.epsi.sin() * dt,
            epsi: state.epsi + turn,
        }
    }

    /// Advances the vehicle by `dt` while measuring the tracking errors against
    /// `path` at the current position: `cte` restarts from `f(x) - y` and
    /// `epsi` from `psi - atan(f'(x))`.
    pub fn propagate_along<T: Scalar>(
        &self,
        state: &VehicleState<T>,
        action: &ControlAction<T>,
        path: &Polynomial,
        dt: f64,
    ) -> VehicleState<T> {
        let step = T::from(dt);
        let turn = self.turn(state.v, action.steering, step);
        VehicleState {
            cte: (path.evaluate(state.x) - state.y) + state.v * state.epsi.sin() * step,
            epsi: (state.psi - path.heading(state.x)) + turn,
            ..self.propagate(state, action, dt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cruising(v: f64) -> VehicleState {
        VehicleState {
            v,
            ..Default::default()
        }
    }

    #[test]
    fn test_straight_line_motion() {
        let model = KinematicBicycle::new(2.67);
        let next = model.propagate(&cruising(10.0), &ControlAction::new(0.0, 0.0), 0.5);
        assert_abs_diff_eq!(next.x, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next.psi, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next.v, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_positive_steering_turns_left() {
        let model = KinematicBicycle::new(2.0);
        let next = model.propagate(&cruising(4.0), &ControlAction::new(0.1, 1.0), 0.5);
        // 4 * 0.1 / 2 * 0.5
        assert_abs_diff_eq!(next.psi, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(next.epsi, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(next.v, 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_errors_follow_path_when_propagating_along() {
        let model = KinematicBicycle::new(2.67);
        // Path one meter to the left, rising at slope 0.5.
        let path = Polynomial::new(vec![1.0, 0.5]);
        let state = VehicleState {
            x: 2.0,
            y: 0.5,
            psi: 0.2,
            v: 5.0,
            cte: 123.0,
            epsi: 0.3,
        };
        let next = model.propagate_along(&state, &ControlAction::new(0.0, 0.0), &path, 0.1);
        assert_abs_diff_eq!(next.cte, 1.5 + 5.0 * 0.3_f64.sin() * 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(next.epsi, 0.2 - 0.5_f64.atan(), epsilon = 1e-12);
        assert_abs_diff_eq!(next.x, 2.0 + 5.0 * 0.2_f64.cos() * 0.1, epsilon = 1e-12);
    }
}
