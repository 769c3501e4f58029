// kestrel_sim/src/simulation/runner.rs

use kestrel_core::messages::{ActuatorCommand, Telemetry};
use kestrel_core::pipeline::MpcPipeline;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, trace, warn};

use super::config::ScenarioConfig;
use super::prng::{SensorNoise, SimulationRng};
use super::track::Track;
use super::vehicle::SimulatedVehicle;
use crate::error::SimError;

/// Aggregate tracking quality of one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RunSummary {
    /// Control cycles executed.
    pub steps: usize,
    /// Cycles whose output was replaced by the fallback command.
    pub failed_cycles: usize,
    /// Mean distance from the vehicle to the track (m).
    pub mean_cte: f64,
    pub max_cte: f64,
    /// Mean ground-truth speed (m/s).
    pub mean_speed: f64,
    /// Distance driven (m).
    pub distance: f64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps ({} failed), cte mean {:.3} m max {:.3} m, speed mean {:.2} m/s, {:.1} m driven",
            self.steps, self.failed_cycles, self.mean_cte, self.max_cte, self.mean_speed, self.distance
        )
    }
}

/// A controller driving a simulated vehicle around a track.
pub struct Simulation {
    scenario: ScenarioConfig,
    pipeline: MpcPipeline,
    track: Track,
    vehicle: SimulatedVehicle,
    rng: SimulationRng,
    noise: SensorNoise,
}

impl Simulation {
    pub fn new(scenario: ScenarioConfig) -> Result<Self, SimError> {
        scenario.validate()?;
        let pipeline = MpcPipeline::new(scenario.mpc.clone())?;
        let track = Track::from_config(&scenario.track);
        let vehicle = SimulatedVehicle::new(
            &scenario.vehicle,
            scenario.mpc.vehicle.lf,
            scenario.mpc.vehicle.max_steering,
            scenario.mpc.telemetry.steering_convention,
            scenario.simulation.integrator.build(),
            scenario.simulation.physics_substeps,
        );
        let rng = SimulationRng::new(scenario.simulation.seed);
        let noise = SensorNoise::new(&scenario.sensors)?;

        Ok(Self {
            scenario,
            pipeline,
            track,
            vehicle,
            rng,
            noise,
        })
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn vehicle(&self) -> &SimulatedVehicle {
        &self.vehicle
    }

    /// Runs until the scenario's duration elapses or an open track runs out.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let period = self.scenario.simulation.control_period;
        let total_steps = (self.scenario.simulation.duration_seconds / period).round() as usize;
        let fallback = self.scenario.controller.fallback;
        let mut last_good = ActuatorCommand::default();
        let mut summary = RunSummary::default();
        let mut cte_sum = 0.0;
        let mut speed_sum = 0.0;

        info!(
            steps = total_steps,
            track_length = self.track.length(),
            "starting closed-loop run"
        );

        for step in 0..total_steps {
            let Some(telemetry) = self.telemetry() else {
                info!(step, "reached the end of the track");
                break;
            };

            let command = match self.pipeline.process(&telemetry) {
                Ok(output) => {
                    trace!(step, predicted = ?output.predicted, "cycle output");
                    last_good = output.command;
                    output.command
                }
                Err(err) => {
                    summary.failed_cycles += 1;
                    let command = fallback.command(last_good);
                    warn!(step, error = %err, ?fallback, "control cycle failed, using fallback");
                    command
                }
            };

            let before = self.vehicle.position();
            self.vehicle.send(command);
            self.vehicle.advance(period);
            let after = self.vehicle.position();

            let cte = self.track.distance_to(&after);
            summary.steps += 1;
            summary.distance += (after - before).norm();
            summary.max_cte = summary.max_cte.max(cte);
            cte_sum += cte;
            speed_sum += self.vehicle.speed();

            debug!(
                step,
                time = self.vehicle.time(),
                cte,
                speed = self.vehicle.speed(),
                steering = command.steering,
                throttle = command.throttle,
                "step"
            );
        }

        if summary.steps > 0 {
            summary.mean_cte = cte_sum / summary.steps as f64;
            summary.mean_speed = speed_sum / summary.steps as f64;
        }
        Ok(summary)
    }

    /// Builds the next telemetry sample, or `None` once too few waypoints
    /// remain ahead to fit a reference.
    fn telemetry(&mut self) -> Option<Telemetry> {
        let pose = self.vehicle.pose();
        let window = self.track.window(
            &self.vehicle.position(),
            pose.heading,
            self.scenario.controller.waypoint_window,
        );
        if window.len() < 2 {
            return None;
        }

        let noise = self.noise.sample(&mut self.rng);
        let applied = self.vehicle.applied();
        let max_steering = self.scenario.mpc.vehicle.max_steering;
        let unit = self.scenario.mpc.telemetry.speed_unit;

        Some(Telemetry {
            waypoints_x: window.iter().map(|p| p.x).collect(),
            waypoints_y: window.iter().map(|p| p.y).collect(),
            x: pose.x + noise.dx,
            y: pose.y + noise.dy,
            psi: pose.heading + noise.dheading,
            speed: unit.from_meters_per_second((self.vehicle.speed() + noise.dspeed).max(0.0)),
            steering_angle: applied.steering_angle(max_steering),
            throttle: applied.throttle,
        })
    }
}
