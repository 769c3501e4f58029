// kestrel_core/src/estimation/mod.rs

pub mod latency;

pub use latency::LatencyCompensator;
