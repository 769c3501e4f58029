// kestrel_sim/src/simulation/config.rs

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use kestrel_core::config::MpcConfig;
use kestrel_core::messages::ActuatorCommand;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::integrators::IntegratorKind;
use crate::error::SimError;

// =========================================================================
// == Top-Level Scenario ==
// =========================================================================

/// # ScenarioConfig
/// Everything a closed-loop run needs. This struct is the root of the data
/// parsed from a `scenario.toml` file; every section falls back to its
/// defaults when omitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub track: TrackConfig,
    #[serde(default)]
    pub vehicle: VehicleSection,
    #[serde(default)]
    pub sensors: NoiseConfig,
    #[serde(default)]
    pub controller: ControllerSection,
    /// The controller's own tuning.
    #[serde(default)]
    pub mpc: MpcConfig,
}

impl ScenarioConfig {
    /// Layers the file at `path` over the built-in defaults.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        // figment treats a missing file as an empty one.
        if !path.is_file() {
            return Err(SimError::InvalidScenario(format!(
                "scenario file {} does not exist",
                path.display()
            )));
        }
        Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path)))
    }

    /// Layers a TOML document over the built-in defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, SimError> {
        Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> Result<Self, SimError> {
        let scenario: Self = figment.extract()?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: String| Err(SimError::InvalidScenario(msg));
        let sim = &self.simulation;

        if !(sim.duration_seconds.is_finite() && sim.duration_seconds > 0.0) {
            return invalid(format!(
                "simulation.duration_seconds must be positive, got {}",
                sim.duration_seconds
            ));
        }
        if !(sim.control_period.is_finite() && sim.control_period > 0.0) {
            return invalid(format!(
                "simulation.control_period must be positive, got {}",
                sim.control_period
            ));
        }
        if sim.physics_substeps == 0 {
            return invalid("simulation.physics_substeps must be at least 1".to_string());
        }
        if !(self.vehicle.actuation_latency.is_finite() && self.vehicle.actuation_latency >= 0.0) {
            return invalid(format!(
                "vehicle.actuation_latency must be non-negative, got {}",
                self.vehicle.actuation_latency
            ));
        }
        if self.controller.waypoint_window < 2 {
            return invalid("controller.waypoint_window must be at least 2".to_string());
        }
        self.track.validate()?;
        self.mpc.validate()?;
        Ok(())
    }
}

// =========================================================================
// == Scenario Sections ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSection {
    /// Seed for the noise generator. Runs without one are not reproducible.
    pub seed: Option<u64>,
    pub duration_seconds: f64,
    /// Seconds between telemetry samples, one controller cycle each.
    pub control_period: f64,
    /// Integration steps per control period.
    pub physics_substeps: usize,
    pub integrator: IntegratorKind,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: Some(42),
            duration_seconds: 20.0,
            control_period: 0.1,
            physics_substeps: 10,
            integrator: IntegratorKind::Rk4,
        }
    }
}

/// Shape of the track the waypoints are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackConfig {
    /// Counter-clockwise circle.
    Circle {
        center: [f64; 2],
        radius: f64,
        /// Arc length between waypoints (m).
        spacing: f64,
    },
    /// `y = amplitude * sin(2 pi x / wavelength)` for `x` in `[0, length]`.
    Sinusoid {
        amplitude: f64,
        wavelength: f64,
        length: f64,
        spacing: f64,
    },
    /// Explicit waypoints.
    Polyline { points: Vec<[f64; 2]>, closed: bool },
}

impl Default for TrackConfig {
    fn default() -> Self {
        TrackConfig::Circle {
            center: [0.0, 0.0],
            radius: 120.0,
            spacing: 8.0,
        }
    }
}

impl TrackConfig {
    fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: &str| Err(SimError::InvalidScenario(msg.to_string()));
        match self {
            TrackConfig::Circle {
                radius, spacing, ..
            } => {
                if !(*radius > 0.0 && *spacing > 0.0 && *spacing < *radius) {
                    return invalid("circle track needs 0 < spacing < radius");
                }
            }
            TrackConfig::Sinusoid {
                wavelength,
                length,
                spacing,
                ..
            } => {
                if !(*wavelength > 0.0 && *spacing > 0.0 && *length > *spacing) {
                    return invalid("sinusoid track needs a positive wavelength and length > spacing > 0");
                }
            }
            TrackConfig::Polyline { points, .. } => {
                if points.len() < 2 {
                    return invalid("polyline track needs at least 2 points");
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleSection {
    /// Starting pose `[x, y, heading_deg]`.
    pub initial_pose: [f64; 3],
    /// Starting speed (m/s).
    pub initial_speed: f64,
    /// Delay between a command being sent and the actuators applying it (s).
    pub actuation_latency: f64,
    /// Acceleration (m/s^2) produced by full throttle.
    ///
    /// The controller assumes a unit gain. Any other value is an intentional
    /// model mismatch, like the plant's `tan(delta)` steering.
    pub throttle_gain: f64,
}

impl Default for VehicleSection {
    fn default() -> Self {
        Self {
            initial_pose: [120.0, 0.0, 90.0],
            initial_speed: 10.0,
            actuation_latency: 0.1,
            throttle_gain: 1.0,
        }
    }
}

/// Standard deviations of the zero-mean Gaussian noise added to telemetry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseConfig {
    pub position_stddev: f64,
    pub heading_stddev: f64,
    pub speed_stddev: f64,
}

/// What the simulated host does when a control cycle fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Keep sending the last successful command.
    #[default]
    Hold,
    /// Keep the steering, release the throttle.
    Coast,
}

impl FallbackPolicy {
    /// The command to send in place of a failed cycle's output.
    pub fn command(self, last_good: ActuatorCommand) -> ActuatorCommand {
        match self {
            FallbackPolicy::Hold => last_good,
            FallbackPolicy::Coast => ActuatorCommand {
                throttle: 0.0,
                ..last_good
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerSection {
    /// Number of upcoming track points sent with each telemetry sample.
    pub waypoint_window: usize,
    pub fallback: FallbackPolicy,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            waypoint_window: 6,
            fallback: FallbackPolicy::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario_is_valid() {
        assert!(ScenarioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let scenario = ScenarioConfig::from_toml_str(
            r#"
            [simulation]
            duration_seconds = 5.0

            [track]
            kind = "sinusoid"
            amplitude = 4.0
            wavelength = 120.0
            length = 400.0
            spacing = 8.0

            [mpc.horizon]
            steps = 10
            "#,
        )
        .unwrap();

        assert_eq!(scenario.simulation.duration_seconds, 5.0);
        assert_eq!(scenario.simulation.control_period, 0.1);
        assert_eq!(scenario.mpc.horizon.steps, 10);
        assert_eq!(scenario.mpc.horizon.dt, 0.12);
        assert!(matches!(scenario.track, TrackConfig::Sinusoid { .. }));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = ScenarioConfig::from_toml_str("[simulation]\nduraton_seconds = 5.0\n");
        assert!(matches!(err, Err(SimError::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = ScenarioConfig::from_toml_str("[controller]\nwaypoint_window = 1\n");
        assert!(matches!(err, Err(SimError::InvalidScenario(_))));

        let err = ScenarioConfig::from_toml_str("[mpc.horizon]\nsteps = 1\n");
        assert!(matches!(err, Err(SimError::Controller(_))));
    }

    #[test]
    fn test_rendered_default_parses_back() {
        let rendered = toml::to_string_pretty(&ScenarioConfig::default()).unwrap();
        let parsed = ScenarioConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, ScenarioConfig::default());
    }

    #[test]
    fn test_fallback_commands() {
        let last = ActuatorCommand {
            steering: -0.2,
            throttle: 0.6,
        };
        assert_eq!(FallbackPolicy::Hold.command(last), last);
        let coast = FallbackPolicy::Coast.command(last);
        assert_eq!(coast.steering, -0.2);
        assert_eq!(coast.throttle, 0.0);
    }

    #[test]
    fn test_bundled_scenarios_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../assets/scenarios");
        for name in ["00_circle.toml", "01_sinusoid.toml", "02_polyline.toml"] {
            let scenario = ScenarioConfig::load(&dir.join(name))
                .unwrap_or_else(|err| panic!("{name}: {err}"));
            assert!(scenario.simulation.duration_seconds > 0.0);
        }
    }
}
