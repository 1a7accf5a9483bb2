use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Lava vent that spawns particles in a horizontal disc around the generator
#[derive(Debug, Clone)]
pub struct LavaEmitter {
    /// Disc radius around the generator position
    pub jitter: f32,
    rng: StdRng,
}

impl LavaEmitter {
    pub fn new(jitter: f32, seed: u64) -> Self {
        Self {
            jitter: jitter.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next spawn position; y is left at the generator height for the caller to snap
    pub fn sample(&mut self, generator: Vec3) -> Vec3 {
        if self.jitter <= 0.0 {
            return generator;
        }

        // sqrt for uniform area density
        let r = self.jitter * self.rng.gen::<f32>().sqrt();
        let theta = self.rng.gen::<f32>() * std::f32::consts::TAU;
        generator + Vec3::new(r * theta.cos(), 0.0, r * theta.sin())
    }
}
