// kestrel_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::optimization::{Bounds, NlpProblem, NlpSolver, Scalar, SolverStatus};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::messages::{ActuatorCommand, CycleOutput, SpeedUnit, SteeringConvention, Telemetry};
pub use crate::path::{FitError, Polynomial};
pub use crate::types::{ControlAction, VehiclePose, VehicleState};

// --- Configuration and Errors ---
pub use crate::config::{CostWeights, HorizonConfig, MpcConfig, VehicleParams};
pub use crate::error::MpcError;

// --- Algorithms ---
pub use crate::control::{MpcController, SolveResult};
pub use crate::estimation::latency::LatencyCompensator;
pub use crate::models::kinematic_bicycle::KinematicBicycle;
pub use crate::optimization::sqp::{SqpOptions, SqpSolver};
pub use crate::pipeline::MpcPipeline;
