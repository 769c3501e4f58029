// kestrel_core/src/types.rs

use nalgebra::{Isometry2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::path::Polynomial;

/// Number of state variables carried per horizon step: `[x, y, psi, v, cte, epsi]`.
pub const STATE_DIM: usize = 6;

/// Number of actuator variables carried per horizon step: `[delta, a]`.
pub const ACTUATOR_DIM: usize = 2;

/// The vehicle at one instant, expressed in either the global or the body frame.
///
/// The struct is generic so the optimizer can build it from dual numbers when
/// differentiating the dynamics constraints. Everything outside the solver uses
/// the `f64` default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState<T = f64> {
    /// Position along the frame's x-axis (m).
    pub x: T,
    /// Position along the frame's y-axis (m).
    pub y: T,
    /// Heading, counter-clockwise from the x-axis (rad).
    pub psi: T,
    /// Longitudinal speed (m/s).
    pub v: T,
    /// Cross-track error to the reference path (m).
    pub cte: T,
    /// Heading error to the reference path tangent (rad).
    pub epsi: T,
}

impl<T: Copy> VehicleState<T> {
    /// Returns the state in decision-vector order.
    pub fn to_array(&self) -> [T; STATE_DIM] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    /// Builds a state from values in decision-vector order.
    pub fn from_array(values: [T; STATE_DIM]) -> Self {
        let [x, y, psi, v, cte, epsi] = values;
        Self {
            x,
            y,
            psi,
            v,
            cte,
            epsi,
        }
    }
}

impl VehicleState {
    /// The state of a vehicle sitting at the origin of its own frame, heading
    /// along +x, measured against `path`.
    ///
    /// Because the frame is re-centered every cycle, `x = y = psi = 0` and the
    /// tracking errors reduce to `cte = f(0)` and `epsi = -atan(f'(0))`.
    pub fn in_body_frame(speed: f64, path: &Polynomial) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: speed,
            cte: path.evaluate(0.0),
            epsi: -path.heading(0.0),
        }
    }

    /// Returns a copy with `psi` and `epsi` wrapped into `(-pi, pi]`.
    pub fn with_wrapped_angles(&self) -> Self {
        Self {
            psi: wrap_angle(self.psi),
            epsi: wrap_angle(self.epsi),
            ..*self
        }
    }
}

/// A single actuator command in model units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlAction<T = f64> {
    /// Steering angle `delta` (rad), positive turns counter-clockwise.
    pub steering: T,
    /// Normalized acceleration `a` in `[-1, 1]`.
    pub acceleration: T,
}

impl<T> ControlAction<T> {
    pub fn new(steering: T, acceleration: T) -> Self {
        Self {
            steering,
            acceleration,
        }
    }
}

/// Planar pose of the vehicle in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehiclePose {
    pub x: f64,
    pub y: f64,
    /// Heading (rad), counter-clockwise from the global x-axis.
    pub heading: f64,
}

impl VehiclePose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// The rigid transform taking body-frame points into the global frame.
    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.heading)
    }
}

/// Wraps an angle into `(-pi, pi]`.
pub fn wrap_angle(angle: f64) -> f64 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_state_array_round_trip_keeps_order() {
        let state = VehicleState {
            x: 1.0,
            y: 2.0,
            psi: 3.0,
            v: 4.0,
            cte: 5.0,
            epsi: 6.0,
        };
        assert_eq!(state.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(VehicleState::from_array(state.to_array()), state);
    }

    #[test]
    fn test_wrap_angle_range() {
        assert_abs_diff_eq!(wrap_angle(0.0), 0.0);
        assert_eq!(wrap_angle(0.12), 0.12);
        assert_abs_diff_eq!(wrap_angle(3.0 * PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(2.0 * PI + 0.25), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-0.5 - 4.0 * PI), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_body_frame_state_on_straight_path() {
        let path = Polynomial::new(vec![0.5, 0.0, 0.0, 0.0]);
        let state = VehicleState::in_body_frame(12.0, &path);
        assert_eq!(state.x, 0.0);
        assert_eq!(state.psi, 0.0);
        assert_eq!(state.v, 12.0);
        assert_abs_diff_eq!(state.cte, 0.5);
        assert_abs_diff_eq!(state.epsi, 0.0);
    }

    #[test]
    fn test_body_frame_heading_error_opposes_path_slope() {
        // Path rising at 45 degrees: the vehicle points 45 degrees to its right.
        let path = Polynomial::new(vec![0.0, 1.0, 0.0, 0.0]);
        let state = VehicleState::in_body_frame(1.0, &path);
        assert_abs_diff_eq!(state.epsi, -PI / 4.0, epsilon = 1e-12);
    }
}
