//! Looping white-noise source (stethoscope surface friction).

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A pre-rendered white-noise buffer played in a loop.
#[derive(Debug, Clone)]
pub struct NoiseLoop {
    buffer: Vec<f64>,
    position: usize,
}

impl NoiseLoop {
    /// Fill `seconds` of uniform noise in [-1, 1) from a seeded generator.
    pub fn new(seconds: f64, sample_rate: f64, seed: u64) -> Self {
        let len = ((seconds * sample_rate) as usize).max(1);
        let mut rng = SmallRng::seed_from_u64(seed);
        let buffer = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        NoiseLoop {
            buffer,
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn next_sample(&mut self) -> f64 {
        let sample = self.buffer[self.position];
        self.position += 1;
        if self.position == self.buffer.len() {
            self.position = 0;
        }
        sample
    }
}
