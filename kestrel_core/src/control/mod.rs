// kestrel_core/src/control/mod.rs

//! The trajectory optimizer: turns a body-frame state and a reference path
//! into the next actuator command and the predicted trajectory.

use nalgebra::Point2;
use tracing::{debug, warn};

use crate::config::MpcConfig;
use crate::error::MpcError;
use crate::optimization::{NlpSolver, SolverStatus, SqpSolver};
use crate::path::Polynomial;
use crate::types::{ControlAction, VehicleState};

pub mod layout;
pub mod problem;

pub use layout::VariableLayout;
pub use problem::TrackingProblem;

/// Outcome of one successful optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub status: SolverStatus,
    /// Objective value at the optimum.
    pub cost: f64,
    /// The command for the first horizon step, model convention.
    pub action: ControlAction,
    /// Planned positions for steps `1..N`, in the frame of the input state.
    pub predicted: Vec<Point2<f64>>,
    pub iterations: usize,
}

/// Receding-horizon controller.
///
/// Holds only immutable configuration and the solver; every call to
/// [`MpcController::solve`] builds its own problem and workspace.
#[derive(Debug, Clone)]
pub struct MpcController<S = SqpSolver> {
    config: MpcConfig,
    solver: S,
}

impl MpcController<SqpSolver> {
    /// Controller backed by the SQP solver configured in `config.solver`.
    pub fn from_config(config: MpcConfig) -> Result<Self, MpcError> {
        let solver = SqpSolver::new(config.solver.clone());
        Self::new(config, solver)
    }
}

impl<S: NlpSolver> MpcController<S> {
    pub fn new(config: MpcConfig, solver: S) -> Result<Self, MpcError> {
        config.validate()?;
        Ok(Self { config, solver })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn layout(&self) -> VariableLayout {
        VariableLayout::new(self.config.horizon.steps)
    }

    /// Optimizes the horizon starting from `state` along `path`.
    ///
    /// A solver that stops without a usable iterate yields
    /// [`MpcError::SolveFailed`]; there is no implicit zero command.
    pub fn solve(&self, state: &VehicleState, path: &Polynomial) -> Result<SolveResult, MpcError> {
        let problem = TrackingProblem::new(&self.config, path);
        let bounds = problem.bounds(&self.config, state);
        let guess = problem.initial_guess(state);

        let solution = match self.solver.solve(&problem, &bounds, &guess) {
            Ok(solution) if solution.status.is_success() => solution,
            Ok(solution) => {
                return Err(self.failed(solution.status, Some(solution.objective), solution.iterations));
            }
            Err(failure) => {
                return Err(self.failed(failure.status, failure.objective, failure.iterations));
            }
        };

        let layout = problem.layout();
        let vars = solution.x.as_slice();
        let vehicle = &self.config.vehicle;
        let first = layout.action_at(vars, 0);
        let action = ControlAction::new(
            first.steering.clamp(-vehicle.max_steering, vehicle.max_steering),
            first
                .acceleration
                .clamp(vehicle.min_acceleration, vehicle.max_acceleration),
        );
        let predicted = (1..layout.steps())
            .map(|t| {
                let s = layout.state_at(vars, t);
                Point2::new(s.x, s.y)
            })
            .collect();

        debug!(
            status = %solution.status,
            cost = solution.objective,
            iterations = solution.iterations,
            steering = action.steering,
            acceleration = action.acceleration,
            "trajectory optimized"
        );

        Ok(SolveResult {
            status: solution.status,
            cost: solution.objective,
            action,
            predicted,
            iterations: solution.iterations,
        })
    }

    fn failed(&self, status: SolverStatus, cost: Option<f64>, iterations: usize) -> MpcError {
        warn!(%status, ?cost, iterations, "trajectory optimization failed");
        MpcError::SolveFailed {
            status,
            cost: cost.filter(|c| c.is_finite()),
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{Bounds, NlpFailure, NlpProblem, NlpSolution};
    use approx::assert_abs_diff_eq;
    use nalgebra::DVector;

    fn test_config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 30.0;
        config.solver.max_iterations = 1000;
        config
    }

    fn controller() -> MpcController {
        MpcController::from_config(test_config()).unwrap()
    }

    #[test]
    fn test_equilibrium_needs_no_correction() {
        let controller = controller();
        let path = Polynomial::new(vec![0.0, 0.0, 0.0, 0.0]);
        let state = VehicleState::in_body_frame(controller.config().horizon.reference_speed, &path);

        let result = controller.solve(&state, &path).unwrap();
        assert!(result.status.is_success());
        assert_abs_diff_eq!(result.action.steering, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.action.acceleration, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.cost, 0.0, epsilon = 1e-2);

        assert_eq!(result.predicted.len(), 7);
        let step = state.v * controller.config().horizon.dt;
        for (t, point) in result.predicted.iter().enumerate() {
            assert_abs_diff_eq!(point.x, step * (t + 1) as f64, epsilon = 1e-2);
            assert_abs_diff_eq!(point.y, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_straight_waypoints_ahead() {
        let controller = controller();
        let waypoints = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(30.0, 0.0),
        ];
        let path = Polynomial::fit_cubic(&waypoints).unwrap();
        assert_abs_diff_eq!(path.coefficients()[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(path.coefficients()[3], 0.0, epsilon = 1e-12);

        let state = VehicleState::in_body_frame(controller.config().horizon.reference_speed, &path);
        assert_abs_diff_eq!(state.cte, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state.epsi, 0.0, epsilon = 1e-12);

        let result = controller.solve(&state, &path).unwrap();
        assert_abs_diff_eq!(result.action.steering, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.action.acceleration, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_path_to_the_left_steers_left() {
        let controller = controller();
        let path = Polynomial::new(vec![1.0, 0.0, 0.0, 0.0]);
        let state = VehicleState::in_body_frame(15.0, &path);

        let result = controller.solve(&state, &path).unwrap();
        assert!(result.action.steering > 0.0);
        // Below the reference speed, so it accelerates.
        assert!(result.action.acceleration > 0.0);
        assert!(result.predicted.last().unwrap().y > 0.0);
    }

    #[test]
    fn test_sharp_curve_respects_actuator_limits() {
        let controller = controller();
        let limit = controller.config().vehicle.max_steering;
        for curvature in [0.02, -0.05, 0.1] {
            let path = Polynomial::new(vec![0.0, 0.0, curvature, 0.0]);
            let state = VehicleState::in_body_frame(35.0, &path);
            let result = controller.solve(&state, &path).unwrap();
            assert!(result.action.steering.abs() <= limit);
            assert!(result.action.acceleration.abs() <= 1.0);
            assert_eq!(result.action.steering.signum(), curvature.signum());
        }
    }

    #[test]
    fn test_longer_horizon_predicts_more_points() {
        let mut config = test_config();
        config.horizon.steps = 12;
        let controller = MpcController::from_config(config).unwrap();
        let path = Polynomial::new(vec![0.2, 0.01, 0.0, 0.0]);
        let state = VehicleState::in_body_frame(20.0, &path);

        let result = controller.solve(&state, &path).unwrap();
        assert_eq!(result.predicted.len(), 11);
        assert_eq!(controller.layout().num_variables(), 12 * 6 + 11 * 2);
    }

    /// Always gives up after a few iterations.
    struct Stalled;

    impl NlpSolver for Stalled {
        fn solve<P: NlpProblem>(
            &self,
            _problem: &P,
            _bounds: &Bounds,
            _initial_guess: &DVector<f64>,
        ) -> Result<NlpSolution, NlpFailure> {
            Err(NlpFailure {
                status: SolverStatus::MaximumCpuTimeExceeded,
                objective: Some(12.5),
                iterations: 3,
            })
        }
    }

    #[test]
    fn test_solver_failure_surfaces_status_and_cost() {
        let controller = MpcController::new(test_config(), Stalled).unwrap();
        let path = Polynomial::new(vec![0.0]);
        let err = controller
            .solve(&VehicleState::in_body_frame(10.0, &path), &path)
            .unwrap_err();
        assert_eq!(
            err,
            MpcError::SolveFailed {
                status: SolverStatus::MaximumCpuTimeExceeded,
                cost: Some(12.5),
                iterations: 3,
            }
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = test_config();
        config.horizon.steps = 1;
        assert!(matches!(
            MpcController::from_config(config),
            Err(MpcError::InvalidConfig(_))
        ));
    }
}
