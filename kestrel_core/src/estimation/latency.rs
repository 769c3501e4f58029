// kestrel_core/src/estimation/latency.rs

use crate::models::KinematicBicycle;
use crate::types::{ControlAction, VehicleState};

/// Projects a measured state forward over the actuation delay.
///
/// A command issued now only reaches the wheels after `latency` seconds, during
/// which the vehicle keeps executing the previous command. Planning from the
/// projected state keeps the first optimized action aligned with the moment it
/// actually takes effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyCompensator {
    model: KinematicBicycle,
    latency: f64,
}

impl LatencyCompensator {
    pub fn new(model: KinematicBicycle, latency: f64) -> Self {
        Self { model, latency }
    }

    /// Delay in seconds.
    pub fn latency(&self) -> f64 {
        self.latency
    }

    /// The state `latency` seconds after `state`, assuming `last_action` (in
    /// model sign convention) stays applied. Angles come back wrapped into
    /// `(-pi, pi]`.
    pub fn compensate(&self, state: &VehicleState, last_action: &ControlAction) -> VehicleState {
        self.model
            .propagate(state, last_action, self.latency)
            .with_wrapped_angles()
    }
}
