// kestrel_sim/src/simulation/mod.rs

pub mod config;
pub mod integrators;
pub mod prng;
pub mod runner;
pub mod track;
pub mod vehicle;
