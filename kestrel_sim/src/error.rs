// kestrel_sim/src/error.rs

use kestrel_core::error::MpcError;
use rand_distr::NormalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to load scenario: {0}")]
    Config(#[from] figment::Error),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("controller setup failed: {0}")]
    Controller(#[from] MpcError),

    #[error("invalid sensor noise: {0}")]
    Noise(#[from] NormalError),

    #[error("failed to render scenario: {0}")]
    Render(#[from] toml::ser::Error),
}
