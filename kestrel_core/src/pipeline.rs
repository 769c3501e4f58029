// kestrel_core/src/pipeline.rs

use tracing::{debug, debug_span};

use crate::config::MpcConfig;
use crate::control::MpcController;
use crate::error::MpcError;
use crate::estimation::LatencyCompensator;
use crate::frames;
use crate::messages::{ActuatorCommand, CycleOutput, Telemetry};
use crate::optimization::{NlpSolver, SqpSolver};
use crate::path::{Polynomial, REFERENCE_DEGREE};
use crate::types::VehicleState;

/// One full control cycle per telemetry sample: waypoints into the body frame,
/// reference fit, latency projection, optimization, command.
///
/// Keeps no state between cycles, so a failed cycle can simply be retried
/// with the next sample.
#[derive(Debug, Clone)]
pub struct MpcPipeline<S = SqpSolver> {
    controller: MpcController<S>,
    compensator: LatencyCompensator,
}

impl MpcPipeline<SqpSolver> {
    pub fn new(config: MpcConfig) -> Result<Self, MpcError> {
        let solver = SqpSolver::new(config.solver.clone());
        Self::with_solver(config, solver)
    }
}

impl<S: NlpSolver> MpcPipeline<S> {
    pub fn with_solver(config: MpcConfig, solver: S) -> Result<Self, MpcError> {
        let compensator = LatencyCompensator::new(config.model(), config.latency.actuation_delay);
        let controller = MpcController::new(config, solver)?;
        Ok(Self {
            controller,
            compensator,
        })
    }

    pub fn config(&self) -> &MpcConfig {
        self.controller.config()
    }

    pub fn process(&self, telemetry: &Telemetry) -> Result<CycleOutput, MpcError> {
        let span = debug_span!("mpc_cycle", waypoints = telemetry.waypoints_x.len());
        let _guard = span.enter();
        let config = self.controller.config();

        let waypoints = telemetry.waypoints()?;
        if waypoints.len() < REFERENCE_DEGREE + 1 {
            return Err(MpcError::InsufficientWaypoints {
                required: REFERENCE_DEGREE + 1,
                got: waypoints.len(),
            });
        }

        let local = frames::to_vehicle_frame(&telemetry.pose(), &waypoints);
        let path = Polynomial::fit_cubic(&local)?;

        let speed = config
            .telemetry
            .speed_unit
            .to_meters_per_second(telemetry.speed);
        let convention = config.telemetry.steering_convention;
        let measured = VehicleState::in_body_frame(speed, &path);
        let state = self
            .compensator
            .compensate(&measured, &telemetry.last_action(convention));
        debug!(
            coefficients = ?path.coefficients(),
            ?measured,
            compensated = ?state,
            "reference fitted"
        );

        let result = self.controller.solve(&state, &path)?;

        let command =
            ActuatorCommand::from_action(&result.action, convention, config.vehicle.max_steering);
        let sampling = config.reference;
        let reference = path
            .samples(sampling.spacing, sampling.spacing, sampling.points)
            .collect();

        debug!(
            steering = command.steering,
            throttle = command.throttle,
            cost = result.cost,
            "command issued"
        );

        Ok(CycleOutput {
            command,
            predicted: result.predicted,
            reference,
            cost: result.cost,
            status: result.status,
            iterations: result.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SteeringConvention;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 30.0;
        config.solver.max_iterations = 1000;
        config
    }

    fn telemetry(points: &[(f64, f64)], x: f64, y: f64, psi: f64, speed_mph: f64) -> Telemetry {
        Telemetry {
            waypoints_x: points.iter().map(|p| p.0).collect(),
            waypoints_y: points.iter().map(|p| p.1).collect(),
            x,
            y,
            psi,
            speed: speed_mph,
            steering_angle: 0.0,
            throttle: 0.0,
        }
    }

    #[test]
    fn test_too_few_waypoints_skip_the_solve() {
        let pipeline = MpcPipeline::new(config()).unwrap();
        let sample = telemetry(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)], 0.0, 0.0, 0.0, 50.0);
        assert_eq!(
            pipeline.process(&sample),
            Err(MpcError::InsufficientWaypoints {
                required: 4,
                got: 3
            })
        );
    }

    #[test]
    fn test_mismatched_waypoints() {
        let pipeline = MpcPipeline::new(config()).unwrap();
        let mut sample = telemetry(&[(0.0, 0.0); 5], 0.0, 0.0, 0.0, 50.0);
        sample.waypoints_y.truncate(4);
        assert_eq!(
            pipeline.process(&sample),
            Err(MpcError::MismatchedWaypoints { xs: 5, ys: 4 })
        );
    }

    #[test]
    fn test_collinear_x_is_a_singular_fit() {
        // Vehicle facing +x, waypoints on a line across its path.
        let pipeline = MpcPipeline::new(config()).unwrap();
        let sample = telemetry(
            &[(10.0, -3.0), (10.0, -1.0), (10.0, 1.0), (10.0, 3.0)],
            0.0,
            0.0,
            0.0,
            50.0,
        );
        assert_eq!(pipeline.process(&sample), Err(MpcError::SingularFit));
    }

    #[test]
    fn test_straight_road_at_reference_speed() {
        let pipeline = MpcPipeline::new(config()).unwrap();
        let sample = telemetry(
            &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)],
            0.0,
            0.0,
            0.0,
            90.0,
        );
        let output = pipeline.process(&sample).unwrap();
        assert_abs_diff_eq!(output.command.steering, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(output.command.throttle, 0.0, epsilon = 1e-3);
        assert_eq!(output.predicted.len(), 7);
        assert_eq!(output.reference.len(), 15);
        assert_abs_diff_eq!(output.reference[0].x, 2.0);
        assert_abs_diff_eq!(output.reference[14].x, 30.0);
        assert_abs_diff_eq!(output.reference[14].y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_default_budget_solves_straight_road() {
        let pipeline = MpcPipeline::new(MpcConfig::default()).unwrap();
        let sample = telemetry(
            &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)],
            0.0,
            0.0,
            0.0,
            90.0,
        );
        let output = pipeline.process(&sample).unwrap();
        assert!(output.status.is_success(), "{}", output.status);
        assert!(output.iterations <= pipeline.config().solver.max_iterations);
        assert_abs_diff_eq!(output.command.steering, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_road_ahead_in_a_rotated_frame() {
        // Vehicle at (100, 50) facing +y, road running straight along +y.
        let pipeline = MpcPipeline::new(config()).unwrap();
        let sample = telemetry(
            &[(100.0, 50.0), (100.0, 60.0), (100.0, 70.0), (100.0, 80.0)],
            100.0,
            50.0,
            FRAC_PI_2,
            90.0,
        );
        let output = pipeline.process(&sample).unwrap();
        assert_abs_diff_eq!(output.command.steering, 0.0, epsilon = 1e-3);
        for point in &output.reference {
            assert_abs_diff_eq!(point.y, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_left_bend_end_to_end_steering_sign() {
        // Road bending towards +y while the vehicle faces +x: a left turn.
        let bend: Vec<(f64, f64)> = (0..6)
            .map(|i| {
                let x = 8.0 * i as f64;
                (x, 0.01 * x * x)
            })
            .collect();
        let sample = telemetry(&bend, 0.0, 0.0, 0.0, 40.0);

        // Positive actuator steering turns right here, so a left turn goes out negative.
        let opposed = MpcPipeline::new(config()).unwrap();
        assert_eq!(
            opposed.config().telemetry.steering_convention,
            SteeringConvention::Opposed
        );
        let output = opposed.process(&sample).unwrap();
        assert!(output.command.steering < 0.0);
        assert!(output.predicted.last().unwrap().y > 0.0);

        let mut aligned_config = config();
        aligned_config.telemetry.steering_convention = SteeringConvention::Aligned;
        let aligned = MpcPipeline::new(aligned_config).unwrap();
        let output = aligned.process(&sample).unwrap();
        assert!(output.command.steering > 0.0);
    }

    #[test]
    fn test_last_command_is_projected_through_latency() {
        // Straight road, but the previous command is still turning left hard.
        let pipeline = MpcPipeline::new(config()).unwrap();
        let road = [(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)];
        let mut turning = telemetry(&road, 0.0, 0.0, 0.0, 90.0);
        // Opposed convention: negative actuator steering is a left turn.
        turning.steering_angle = -0.3;

        let output = pipeline.process(&turning).unwrap();
        // Projected heading points left of the road, so the correction turns right.
        assert!(output.command.steering > 0.0);
    }
}
