// kestrel_sim/src/simulation/vehicle.rs

use kestrel_core::messages::{ActuatorCommand, SteeringConvention};
use kestrel_core::types::{wrap_angle, VehiclePose};
use nalgebra::{DVector, Point2};
use std::collections::VecDeque;

use super::config::VehicleSection;
use super::integrators::Integrator;

/// The ground-truth vehicle the controller drives.
///
/// Plant state is `[x, y, psi, v]` in the global frame. The plant steers with
/// `tan(delta)`, so the controller's small-angle model never matches it
/// exactly. Commands reach the actuators only after `latency` seconds.
pub struct SimulatedVehicle {
    state: DVector<f64>,
    time: f64,
    lf: f64,
    max_steering: f64,
    throttle_gain: f64,
    latency: f64,
    convention: SteeringConvention,
    integrator: Box<dyn Integrator>,
    substeps: usize,
    pending: VecDeque<(f64, ActuatorCommand)>,
    applied: ActuatorCommand,
}

impl SimulatedVehicle {
    pub fn new(
        section: &VehicleSection,
        lf: f64,
        max_steering: f64,
        convention: SteeringConvention,
        integrator: Box<dyn Integrator>,
        substeps: usize,
    ) -> Self {
        let [x, y, heading_deg] = section.initial_pose;
        Self {
            state: DVector::from_vec(vec![x, y, heading_deg.to_radians(), section.initial_speed]),
            time: 0.0,
            lf,
            max_steering,
            throttle_gain: section.throttle_gain,
            latency: section.actuation_latency,
            convention,
            integrator,
            substeps: substeps.max(1),
            pending: VecDeque::new(),
            applied: ActuatorCommand::default(),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pose(&self) -> VehiclePose {
        VehiclePose::new(self.state[0], self.state[1], self.state[2])
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.state[0], self.state[1])
    }

    /// Speed in m/s.
    pub fn speed(&self) -> f64 {
        self.state[3]
    }

    /// The command the actuators are currently executing.
    pub fn applied(&self) -> ActuatorCommand {
        self.applied
    }

    /// Queues `command`; it takes effect `latency` seconds from now.
    pub fn send(&mut self, command: ActuatorCommand) {
        self.pending.push_back((self.time + self.latency, command));
    }

    /// Integrates the plant forward by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        let h = dt / self.substeps as f64;
        for _ in 0..self.substeps {
            self.apply_due_commands();

            let delta = self
                .convention
                .to_model(self.applied.steering * self.max_steering);
            let acceleration = self.applied.throttle * self.throttle_gain;
            let lf = self.lf;
            let dynamics = move |x: &DVector<f64>, _t: f64| {
                let (psi, v) = (x[2], x[3]);
                DVector::from_vec(vec![
                    v * psi.cos(),
                    v * psi.sin(),
                    v * delta.tan() / lf,
                    acceleration,
                ])
            };

            let t0 = self.time;
            self.state = self.integrator.step(&dynamics, &self.state, t0, t0 + h);
            self.state[2] = wrap_angle(self.state[2]);
            self.state[3] = self.state[3].max(0.0);
            self.time = t0 + h;
        }
        self.apply_due_commands();
    }

    fn apply_due_commands(&mut self) {
        // Tolerate the rounding left over from summing substeps.
        let now = self.time + 1e-9;
        while let Some(&(due, command)) = self.pending.front() {
            if due > now {
                break;
            }
            self.applied = command;
            self.pending.pop_front();
        }
    }
}
