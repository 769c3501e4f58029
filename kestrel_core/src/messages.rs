// kestrel_core/src/messages.rs

//! Data crossing the controller boundary: telemetry coming in from the
//! vehicle (or a simulator) and commands going back out.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::MpcError;
use crate::optimization::SolverStatus;
use crate::types::{ControlAction, VehiclePose};

/// Meters per second in one mile per hour.
pub const MPH_TO_METERS_PER_SECOND: f64 = 0.44704;

// --- Inbound ---

/// One telemetry sample. Field names follow the simulator's JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Global x coordinates of the upcoming waypoints.
    #[serde(rename = "ptsx")]
    pub waypoints_x: Vec<f64>,
    /// Global y coordinates of the upcoming waypoints.
    #[serde(rename = "ptsy")]
    pub waypoints_y: Vec<f64>,
    pub x: f64,
    pub y: f64,
    /// Global heading (rad).
    pub psi: f64,
    /// Speed in the unit configured by [`SpeedUnit`].
    pub speed: f64,
    /// Last applied steering angle (rad), in the actuator's sign convention.
    pub steering_angle: f64,
    /// Last applied throttle, normalized to `[-1, 1]`.
    pub throttle: f64,
}

impl Telemetry {
    pub fn pose(&self) -> VehiclePose {
        VehiclePose::new(self.x, self.y, self.psi)
    }

    /// Pairs up the waypoint coordinates.
    pub fn waypoints(&self) -> Result<Vec<Point2<f64>>, MpcError> {
        if self.waypoints_x.len() != self.waypoints_y.len() {
            return Err(MpcError::MismatchedWaypoints {
                xs: self.waypoints_x.len(),
                ys: self.waypoints_y.len(),
            });
        }
        Ok(self
            .waypoints_x
            .iter()
            .zip(self.waypoints_y.iter())
            .map(|(&x, &y)| Point2::new(x, y))
            .collect())
    }

    /// The command still being executed, converted into model convention.
    pub fn last_action(&self, convention: SteeringConvention) -> ControlAction {
        ControlAction::new(convention.to_model(self.steering_angle), self.throttle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    MilesPerHour,
    MetersPerSecond,
}

impl SpeedUnit {
    pub fn to_meters_per_second(self, speed: f64) -> f64 {
        match self {
            SpeedUnit::MilesPerHour => speed * MPH_TO_METERS_PER_SECOND,
            SpeedUnit::MetersPerSecond => speed,
        }
    }

    pub fn from_meters_per_second(self, speed: f64) -> f64 {
        match self {
            SpeedUnit::MilesPerHour => speed / MPH_TO_METERS_PER_SECOND,
            SpeedUnit::MetersPerSecond => speed,
        }
    }
}

/// How the actuator's positive steering direction relates to the model's.
///
/// The model steers counter-clockwise (left) for positive `delta`. Some
/// actuators, the reference simulator among them, treat positive steering as a
/// right turn. The sign is flipped in exactly two places: [`Self::to_model`]
/// on the way in and [`Self::to_actuator`] on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringConvention {
    /// Positive actuator steering turns right.
    #[default]
    Opposed,
    /// Positive actuator steering turns left, like the model.
    Aligned,
}

impl SteeringConvention {
    fn sign(self) -> f64 {
        match self {
            SteeringConvention::Opposed => -1.0,
            SteeringConvention::Aligned => 1.0,
        }
    }

    pub fn to_model(self, actuator_steering: f64) -> f64 {
        self.sign() * actuator_steering
    }

    pub fn to_actuator(self, model_steering: f64) -> f64 {
        self.sign() * model_steering
    }
}

// --- Outbound ---

/// What is sent back to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorCommand {
    /// Steering as a fraction of the steering limit, in `[-1, 1]`, actuator convention.
    #[serde(rename = "steering_angle")]
    pub steering: f64,
    /// Throttle in `[-1, 1]`.
    pub throttle: f64,
}

impl ActuatorCommand {
    pub fn from_action(
        action: &ControlAction,
        convention: SteeringConvention,
        steering_limit: f64,
    ) -> Self {
        Self {
            steering: convention
                .to_actuator(action.steering / steering_limit)
                .clamp(-1.0, 1.0),
            throttle: action.acceleration.clamp(-1.0, 1.0),
        }
    }

    /// Steering angle in radians, actuator convention.
    pub fn steering_angle(&self, steering_limit: f64) -> f64 {
        self.steering * steering_limit
    }
}

/// Everything one control cycle produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutput {
    pub command: ActuatorCommand,
    /// Optimized positions for horizon steps `1..N`, vehicle frame.
    pub predicted: Vec<Point2<f64>>,
    /// Samples of the fitted reference path, vehicle frame.
    pub reference: Vec<Point2<f64>>,
    pub cost: f64,
    pub status: SolverStatus,
    pub iterations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_waypoints_pair_coordinates() {
        let telemetry = sample_telemetry();
        assert_eq!(telemetry.waypoints_x.len(), 2);
        assert_eq!(telemetry.waypoints().unwrap()[1], Point2::new(2.0, 4.0));
        assert_abs_diff_eq!(telemetry.psi, 0.5);
    }

    fn sample_telemetry() -> Telemetry {
        Telemetry {
            waypoints_x: vec![1.0, 2.0],
            waypoints_y: vec![3.0, 4.0],
            x: 0.0,
            y: 0.0,
            psi: 0.5,
            speed: 10.0,
            steering_angle: 0.0,
            throttle: 0.0,
        }
    }

    #[test]
    fn test_mismatched_waypoints() {
        let mut telemetry = sample_telemetry();
        telemetry.waypoints_y.pop();
        assert_eq!(
            telemetry.waypoints(),
            Err(MpcError::MismatchedWaypoints { xs: 2, ys: 1 })
        );
    }

    #[test]
    fn test_speed_conversion() {
        let mph = SpeedUnit::MilesPerHour;
        assert_abs_diff_eq!(mph.to_meters_per_second(90.0), 40.2336, epsilon = 1e-9);
        assert_abs_diff_eq!(mph.from_meters_per_second(40.2336), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(SpeedUnit::MetersPerSecond.to_meters_per_second(12.0), 12.0);
    }

    #[test]
    fn test_opposed_convention_round_trips_through_model() {
        let convention = SteeringConvention::Opposed;
        assert_eq!(convention.to_model(0.2), -0.2);
        assert_eq!(convention.to_actuator(convention.to_model(0.2)), 0.2);
        assert_eq!(SteeringConvention::Aligned.to_model(0.2), 0.2);
    }

    #[test]
    fn test_command_normalizes_and_flips_steering() {
        let limit = 25.0_f64.to_radians();
        // A left turn in the model at half the limit.
        let action = ControlAction::new(0.5 * limit, 0.3);
        let command = ActuatorCommand::from_action(&action, SteeringConvention::Opposed, limit);
        assert_abs_diff_eq!(command.steering, -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(command.throttle, 0.3);
        assert_abs_diff_eq!(command.steering_angle(limit), -0.5 * limit, epsilon = 1e-12);

        let saturated = ActuatorCommand::from_action(
            &ControlAction::new(2.0, -3.0),
            SteeringConvention::Aligned,
            limit,
        );
        assert_eq!(saturated.steering, 1.0);
        assert_eq!(saturated.throttle, -1.0);
    }
}
