// kestrel_core/src/control/layout.rs

use crate::types::{ControlAction, VehicleState, ACTUATOR_DIM, STATE_DIM};

/// Maps horizon steps and semantic roles onto decision-vector indices.
///
/// The vector holds six state trajectories of length `N` (x, y, psi, v, cte,
/// epsi), then the steering and acceleration trajectories of length `N - 1`.
/// Constraint rows use the same order as the state part: row `k * N + t`
/// belongs to state component `k` at step `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    steps: usize,
}

impl VariableLayout {
    pub fn new(steps: usize) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn num_variables(&self) -> usize {
        STATE_DIM * self.steps + ACTUATOR_DIM * self.actuator_steps()
    }

    pub fn num_constraints(&self) -> usize {
        STATE_DIM * self.steps
    }

    /// Steps that carry an actuator command.
    pub fn actuator_steps(&self) -> usize {
        self.steps.saturating_sub(1)
    }

    /// Index of state component `component` (in [`VehicleState::to_array`]
    /// order) at step `t`.
    pub fn state_index(&self, component: usize, t: usize) -> usize {
        component * self.steps + t
    }

    pub fn steering_index(&self, t: usize) -> usize {
        STATE_DIM * self.steps + t
    }

    pub fn acceleration_index(&self, t: usize) -> usize {
        STATE_DIM * self.steps + self.actuator_steps() + t
    }

    pub fn state_at<T: Copy>(&self, vars: &[T], t: usize) -> VehicleState<T> {
        VehicleState::from_array(std::array::from_fn(|k| vars[self.state_index(k, t)]))
    }

    pub fn action_at<T: Copy>(&self, vars: &[T], t: usize) -> ControlAction<T> {
        ControlAction::new(vars[self.steering_index(t)], vars[self.acceleration_index(t)])
    }

    /// Writes one value per state component at step `t`. Serves both the
    /// decision vector and the constraint rows.
    pub fn write_state<T: Copy>(&self, out: &mut [T], t: usize, values: [T; STATE_DIM]) {
        for (k, value) in values.into_iter().enumerate() {
            out[self.state_index(k, t)] = value;
        }
    }

    pub fn write_action<T: Copy>(&self, out: &mut [T], t: usize, action: &ControlAction<T>) {
        out[self.steering_index(t)] = action.steering;
        out[self.acceleration_index(t)] = action.acceleration;
    }
}
