//! CPU-bound computation collaborator

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::core::{
    error::{RalError, RalResult},
    traits::Compute,
};

/// Monte-Carlo estimate of pi. Seeded, so every call returns the same string
/// for the same configuration.
#[derive(Clone, Debug)]
pub struct MathEngine {
    samples: u64,
    seed: u64,
}

impl MathEngine {
    pub fn new(samples: u64, seed: u64) -> Self {
        Self { samples, seed }
    }
}

impl Compute for MathEngine {
    fn execute(&self) -> RalResult<String> {
        if self.samples == 0 {
            return Err(RalError::Validation(
                "compute samples must be positive".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let inside = (0..self.samples)
            .filter(|_| {
                let x: f64 = rng.gen();
                let y: f64 = rng.gen();
                x * x + y * y <= 1.0
            })
            .count();

        let estimate = 4.0 * inside as f64 / self.samples as f64;
        Ok(format!("{estimate:.6}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_per_seed() {
        let engine = MathEngine::new(10_000, 7);
        let first = engine.execute().unwrap();
        assert_eq!(first, engine.execute().unwrap());

        let estimate: f64 = first.parse().unwrap();
        assert!((estimate - std::f64::consts::PI).abs() < 0.1);
    }

    #[test]
    fn test_zero_samples_rejected() {
        assert!(MathEngine::new(0, 1).execute().is_err());
    }
}
