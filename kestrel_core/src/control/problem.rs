// kestrel_core/src/control/problem.rs

use nalgebra::DVector;

use super::layout::VariableLayout;
use crate::config::{CostWeights, MpcConfig};
use crate::models::KinematicBicycle;
use crate::optimization::{Bounds, NlpProblem, Scalar};
use crate::path::Polynomial;
use crate::types::{ControlAction, VehicleState, STATE_DIM};

/// The finite-horizon tracking problem for one control cycle.
///
/// Minimizes tracking error, speed deviation, actuator effort and actuator
/// rate over the horizon, subject to the kinematic model linking consecutive
/// states. Borrowed data only; built and dropped inside a single solve.
pub struct TrackingProblem<'a> {
    layout: VariableLayout,
    weights: CostWeights,
    reference_speed: f64,
    dt: f64,
    model: KinematicBicycle,
    path: &'a Polynomial,
}

fn squared<T: Scalar>(value: T) -> T {
    value * value
}

impl<'a> TrackingProblem<'a> {
    pub fn new(config: &MpcConfig, path: &'a Polynomial) -> Self {
        Self {
            layout: VariableLayout::new(config.horizon.steps),
            weights: config.weights,
            reference_speed: config.horizon.reference_speed,
            dt: config.horizon.dt,
            model: config.model(),
            path,
        }
    }

    pub fn layout(&self) -> VariableLayout {
        self.layout
    }

    /// Variable bounds from the actuator limits, and constraint bounds that pin
    /// the first step to `initial` while holding every model residual at zero.
    pub fn bounds(&self, config: &MpcConfig, initial: &VehicleState) -> Bounds {
        let layout = self.layout;
        let mut bounds = Bounds::unbounded(layout.num_variables(), layout.num_constraints());

        for t in 0..layout.actuator_steps() {
            let steer = layout.steering_index(t);
            bounds.variables_lower[steer] = -config.vehicle.max_steering;
            bounds.variables_upper[steer] = config.vehicle.max_steering;

            let accel = layout.acceleration_index(t);
            bounds.variables_lower[accel] = config.vehicle.min_acceleration;
            bounds.variables_upper[accel] = config.vehicle.max_acceleration;
        }

        layout.write_state(bounds.constraints_lower.as_mut_slice(), 0, initial.to_array());
        layout.write_state(bounds.constraints_upper.as_mut_slice(), 0, initial.to_array());

        bounds
    }

    /// Rolls the model forward from `initial` with zero actuation, giving a
    /// starting point that already satisfies every equality constraint.
    pub fn initial_guess(&self, initial: &VehicleState) -> DVector<f64> {
        let layout = self.layout;
        let mut guess = DVector::zeros(layout.num_variables());
        let idle = ControlAction::default();

        let mut state = *initial;
        layout.write_state(guess.as_mut_slice(), 0, state.to_array());
        for t in 1..layout.steps() {
            state = self.model.propagate_along(&state, &idle, self.path, self.dt);
            layout.write_state(guess.as_mut_slice(), t, state.to_array());
        }
        guess
    }
}

impl NlpProblem for TrackingProblem<'_> {
    fn num_variables(&self) -> usize {
        self.layout.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.layout.num_constraints()
    }

    fn objective<T: Scalar>(&self, vars: &[T]) -> T {
        let layout = self.layout;
        let w = &self.weights;
        let reference_speed = T::from(self.reference_speed);
        let mut cost = T::zero();

        // --- Tracking ---
        for t in 0..layout.steps() {
            let state = layout.state_at(vars, t);
            cost = cost
                + T::from(w.cte) * squared(state.cte)
                + T::from(w.epsi) * squared(state.epsi)
                + T::from(w.speed) * squared(state.v - reference_speed);
        }

        // --- Actuator effort ---
        for t in 0..layout.actuator_steps() {
            let action = layout.action_at(vars, t);
            cost = cost
                + T::from(w.steering) * squared(action.steering)
                + T::from(w.acceleration) * squared(action.acceleration);
        }

        // --- Actuator rate ---
        for t in 1..layout.actuator_steps() {
            let previous = layout.action_at(vars, t - 1);
            let action = layout.action_at(vars, t);
            cost = cost
                + T::from(w.steering_rate) * squared(action.steering - previous.steering)
                + T::from(w.acceleration_rate)
                    * squared(action.acceleration - previous.acceleration);
        }

        cost
    }

    fn constraints<T: Scalar>(&self, vars: &[T], out: &mut [T]) {
        let layout = self.layout;
        layout.write_state(out, 0, layout.state_at(vars, 0).to_array());

        for t in 1..layout.steps() {
            let previous = layout.state_at(vars, t - 1);
            let action = layout.action_at(vars, t - 1);
            let predicted = self
                .model
                .propagate_along(&previous, &action, self.path, self.dt)
                .to_array();
            let actual = layout.state_at(vars, t).to_array();
            let residual: [T; STATE_DIM] = std::array::from_fn(|k| actual[k] - predicted[k]);
            layout.write_state(out, t, residual);
        }
    }
}
