// kestrel_core/src/config.rs

use serde::{Deserialize, Serialize};

use crate::error::MpcError;
use crate::messages::{SpeedUnit, SteeringConvention};
use crate::models::KinematicBicycle;
use crate::optimization::SqpOptions;

// =========================================================================
// == Top-Level Controller Configuration ==
// =========================================================================

/// # MpcConfig
/// Every tunable of the controller. Fixed for the lifetime of a controller;
/// build a new one to change it. Each section may be omitted from a config
/// file, in which case its defaults apply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpcConfig {
    #[serde(default)]
    pub horizon: HorizonConfig,
    #[serde(default)]
    pub weights: CostWeights,
    #[serde(default)]
    pub vehicle: VehicleParams,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub reference: ReferenceSampling,
    #[serde(default)]
    pub solver: SqpOptions,
}

impl MpcConfig {
    /// Rejects values the optimizer cannot work with.
    pub fn validate(&self) -> Result<(), MpcError> {
        let invalid = |msg: String| Err(MpcError::InvalidConfig(msg));

        if self.horizon.steps < 2 {
            return invalid(format!(
                "horizon.steps must be at least 2, got {}",
                self.horizon.steps
            ));
        }
        for (name, value) in [
            ("horizon.dt", self.horizon.dt),
            ("vehicle.lf", self.vehicle.lf),
            ("vehicle.max_steering", self.vehicle.max_steering),
            ("reference.spacing", self.reference.spacing),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        for (name, value) in [
            ("horizon.reference_speed", self.horizon.reference_speed),
            ("latency.actuation_delay", self.latency.actuation_delay),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{name} must be non-negative, got {value}"));
            }
        }
        for (name, value) in self.weights.named() {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("weights.{name} must be non-negative, got {value}"));
            }
        }
        let (lo, hi) = (self.vehicle.min_acceleration, self.vehicle.max_acceleration);
        if !(lo.is_finite() && hi.is_finite() && lo < hi && lo >= -1.0 && hi <= 1.0) {
            return invalid(format!(
                "vehicle acceleration range [{lo}, {hi}] must be a non-empty part of [-1, 1]"
            ));
        }
        self.solver.validate().map_err(MpcError::InvalidConfig)
    }

    pub fn model(&self) -> KinematicBicycle {
        KinematicBicycle::new(self.vehicle.lf)
    }
}

// =========================================================================
// == Configuration Sections ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    /// Number of predicted states `N`.
    pub steps: usize,
    /// Seconds between predicted states.
    pub dt: f64,
    /// Target speed (m/s).
    pub reference_speed: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            steps: 8,
            dt: 0.12,
            reference_speed: 90.0 * crate::messages::MPH_TO_METERS_PER_SECOND,
        }
    }
}

/// Relative weights of the cost terms.
///
/// Heading error and actuator magnitude dominate cross-track error, which in
/// turn dominates speed tracking. Rate penalties sit below the magnitude
/// penalties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub speed: f64,
    pub steering: f64,
    pub acceleration: f64,
    pub steering_rate: f64,
    pub acceleration_rate: f64,
}

impl CostWeights {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("cte", self.cte),
            ("epsi", self.epsi),
            ("speed", self.speed),
            ("steering", self.steering),
            ("acceleration", self.acceleration),
            ("steering_rate", self.steering_rate),
            ("acceleration_rate", self.acceleration_rate),
        ]
    }
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 200.0,
            epsi: 3000.0,
            speed: 20.0,
            steering: 5000.0,
            acceleration: 500.0,
            steering_rate: 500.0,
            acceleration_rate: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleParams {
    /// Front axle to center of gravity (m).
    pub lf: f64,
    /// Symmetric steering limit (rad).
    pub max_steering: f64,
    pub min_acceleration: f64,
    pub max_acceleration: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            lf: 2.67,
            max_steering: 25.0_f64.to_radians(),
            min_acceleration: -1.0,
            max_acceleration: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LatencyConfig {
    /// Time between issuing a command and the actuator applying it (s).
    pub actuation_delay: f64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            actuation_delay: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub speed_unit: SpeedUnit,
    pub steering_convention: SteeringConvention,
}

/// Where the fitted reference path is sampled for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceSampling {
    pub points: usize,
    /// Distance between samples along the vehicle's x-axis (m). The first
    /// sample sits one spacing ahead of the vehicle.
    pub spacing: f64,
}

impl Default for ReferenceSampling {
    fn default() -> Self {
        Self {
            points: 15,
            spacing: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = MpcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.horizon.steps, 8);
        assert_abs_diff_eq!(config.horizon.reference_speed, 40.2336, epsilon = 1e-9);
        assert_abs_diff_eq!(config.vehicle.max_steering, 0.436332, epsilon = 1e-6);
        assert_eq!(config.telemetry.steering_convention, SteeringConvention::Opposed);
    }

    #[test]
    fn test_default_weights_keep_their_ordering() {
        let w = CostWeights::default();
        assert!(w.epsi > w.cte && w.steering > w.cte && w.acceleration > w.cte);
        assert!(w.cte > w.speed);
        assert!(w.steering_rate < w.steering && w.steering_rate > 0.0);
        assert!(w.acceleration_rate < w.acceleration && w.acceleration_rate > 0.0);
    }

    #[test]
    fn test_rejects_short_horizon_and_bad_values() {
        let mut config = MpcConfig::default();
        config.horizon.steps = 1;
        assert!(matches!(config.validate(), Err(MpcError::InvalidConfig(_))));

        let mut config = MpcConfig::default();
        config.vehicle.lf = 0.0;
        assert!(config.validate().is_err());

        let mut config = MpcConfig::default();
        config.weights.cte = -1.0;
        assert!(config.validate().is_err());

        let mut config = MpcConfig::default();
        config.latency.actuation_delay = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = MpcConfig::default();
        config.vehicle.max_acceleration = 2.0;
        assert!(config.validate().is_err());

        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = -1.0;
        assert!(config.validate().is_err());
    }
}
