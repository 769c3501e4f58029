// kestrel_sim/src/simulation/prng.rs

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, NormalError};

use super::config::NoiseConfig;

/// A newtype wrapper around `ChaCha8Rng`.
/// This is the central, deterministic pseudo-random number generator for the simulation.
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    /// Seeded generator, or one drawn from OS entropy when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(ChaCha8Rng::seed_from_u64(seed)),
            None => Self(ChaCha8Rng::from_entropy()),
        }
    }
}

/// Zero-mean Gaussian noise for each telemetry channel.
#[derive(Debug, Clone, Copy)]
pub struct SensorNoise {
    position: Normal<f64>,
    heading: Normal<f64>,
    speed: Normal<f64>,
}

/// One draw of [`SensorNoise`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoiseSample {
    pub dx: f64,
    pub dy: f64,
    pub dheading: f64,
    pub dspeed: f64,
}

impl SensorNoise {
    pub fn new(config: &NoiseConfig) -> Result<Self, NormalError> {
        Ok(Self {
            position: Normal::new(0.0, config.position_stddev)?,
            heading: Normal::new(0.0, config.heading_stddev)?,
            speed: Normal::new(0.0, config.speed_stddev)?,
        })
    }

    pub fn sample(&self, rng: &mut SimulationRng) -> NoiseSample {
        NoiseSample {
            dx: self.position.sample(&mut rng.0),
            dy: self.position.sample(&mut rng.0),
            dheading: self.heading.sample(&mut rng.0),
            dspeed: self.speed.sample(&mut rng.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let config = NoiseConfig {
            position_stddev: 0.5,
            heading_stddev: 0.01,
            speed_stddev: 0.2,
        };
        let noise = SensorNoise::new(&config).unwrap();
        let mut a = SimulationRng::new(Some(7));
        let mut b = SimulationRng::new(Some(7));
        for _ in 0..10 {
            assert_eq!(noise.sample(&mut a), noise.sample(&mut b));
        }
    }

    #[test]
    fn test_zero_deviation_is_silent() {
        let noise = SensorNoise::new(&NoiseConfig::default()).unwrap();
        let mut rng = SimulationRng::new(Some(1));
        assert_eq!(noise.sample(&mut rng), NoiseSample::default());
    }

    #[test]
    fn test_negative_deviation_is_rejected() {
        let config = NoiseConfig {
            speed_stddev: -1.0,
            ..Default::default()
        };
        assert!(SensorNoise::new(&config).is_err());
    }
}
