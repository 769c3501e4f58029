// kestrel_sim/src/prelude.rs

// Re-export the entire kestrel_core prelude so simulation code can reach the
// controller types directly.
pub use kestrel_core::prelude::*;

pub use crate::error::SimError;
pub use crate::simulation::config::{
    ControllerSection, FallbackPolicy, NoiseConfig, ScenarioConfig, SimulationSection,
    TrackConfig, VehicleSection,
};
pub use crate::simulation::integrators::{Euler, Integrator, IntegratorKind, Rk4};
pub use crate::simulation::prng::{SensorNoise, SimulationRng};
pub use crate::simulation::runner::{RunSummary, Simulation};
pub use crate::simulation::track::Track;
pub use crate::simulation::vehicle::SimulatedVehicle;
