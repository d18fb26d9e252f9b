use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

// draws shorter than this are too close to the origin to normalize reliably
const MIN_DIRECTION_NORM: f32 = 1e-3;

/// Source of the random initial pose errors and scene jitter of a sweep.
///
/// The engine is seeded once and advanced by every draw; it is never reset during a sweep.
#[derive(Debug, Clone)]
pub struct PerturbationSampler<R = StdRng> {
    rng: R,
}

impl PerturbationSampler<StdRng> {
    /// A sampler seeded from the operating system entropy source.
    pub fn from_entropy() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// A reproducible sampler.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> PerturbationSampler<R> {
    /// Wrap an existing engine.
    pub fn from_rng(rng: R) -> Self {
        Self { rng }
    }

    /// A uniform draw in `[-1, 1]`.
    pub fn uniform(&mut self) -> f32 {
        self.rng.random_range(-1.0..=1.0)
    }

    /// A unit vector obtained by normalizing three independent uniform draws.
    ///
    /// Draws too close to zero are discarded and redrawn.
    pub fn sample_direction(&mut self) -> Vec3 {
        loop {
            let v = Vec3::new(self.uniform(), self.uniform(), self.uniform());
            let norm = v.length();
            if norm > MIN_DIRECTION_NORM {
                return v / norm;
            }
        }
    }

    /// A translation error of length `magnitude` in a random direction.
    ///
    /// A zero magnitude yields the zero vector.
    pub fn sample_error(&mut self, magnitude: f32) -> Vec3 {
        self.sample_direction() * magnitude
    }

    /// `base` jittered by up to half of `amplitude` in either direction.
    pub fn jitter(&mut self, base: f32, amplitude: f32) -> f32 {
        base + amplitude * self.uniform() * 0.5
    }
}
