// kestrel_core/src/models/mod.rs

pub mod kinematic_bicycle;

pub use kinematic_bicycle::KinematicBicycle;
