use glam::Vec3;
use rayon::prelude::*;

use super::particle_data::ParticleStore;
use crate::constants::time::NAN_STEP_FALLBACK;
use crate::terrain::TerrainHeightField;

/// Fixed-step accumulator decoupling the simulation step from the frame rate
#[derive(Debug, Clone)]
pub struct StepClock {
    elapsed: f32,
    dt: f32,
    max_substeps: usize,
}

impl StepClock {
    pub fn new(dt: f32, max_substeps: usize) -> Self {
        Self {
            elapsed: 0.0,
            dt,
            max_substeps: max_substeps.max(1),
        }
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn set_dt(&mut self, dt: f32) {
        self.dt = dt;
    }

    /// Time carried over to the next frame
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Fraction of a step carried over, for render interpolation
    pub fn alpha(&self) -> f32 {
        let alpha = self.elapsed / self.dt;
        if alpha.is_finite() {
            alpha
        } else {
            0.0
        }
    }

    /// Add a frame's duration and return how many fixed steps to run
    pub fn advance(&mut self, frame_dt: f32) -> usize {
        if frame_dt.is_finite() && frame_dt > 0.0 {
            self.elapsed += frame_dt;
        }

        if !(self.elapsed / self.dt).is_finite() || self.dt <= 0.0 {
            log::warn!(
                "Non-finite step count (elapsed {}, dt {}), resetting clock",
                self.elapsed,
                self.dt
            );
            self.elapsed = 0.0;
            return NAN_STEP_FALLBACK;
        }

        let mut steps = 0;
        while self.elapsed > self.dt && steps < self.max_substeps {
            self.elapsed -= self.dt;
            steps += 1;
        }

        if self.elapsed > self.dt {
            // Drop the backlog rather than spiral
            log::debug!(
                "Frame needed more than {} steps, dropping {:.4}s",
                self.max_substeps,
                self.elapsed - self.elapsed % self.dt
            );
            self.elapsed %= self.dt;
        }

        steps
    }
}

/// Move the first `n` particles along their velocity and snap them onto the terrain
///
/// Particles leaving the terrain are clamped to its border, stopped and frozen.
/// Returns the indices of the particles frozen by this call, in ascending order.
pub fn integrate(store: &mut ParticleStore, terrain: &TerrainHeightField, dt: f32, n: usize) -> Vec<usize> {
    let size = terrain.size();

    store.positions[..n]
        .par_iter_mut()
        .zip(store.velocities[..n].par_iter_mut())
        .zip(store.frozen[..n].par_iter_mut())
        .enumerate()
        .filter_map(|(i, ((position, velocity), frozen))| {
            if *frozen {
                return None;
            }

            let next = *position + *velocity * dt;
            if !next.is_finite() {
                *velocity = Vec3::ZERO;
                return None;
            }

            if terrain.contains(next.x, next.z) {
                *position = Vec3::new(next.x, terrain.sample(next.x, next.z), next.z);
                None
            } else {
                let x = next.x.clamp(0.0, size.x);
                let z = next.z.clamp(0.0, size.y);
                *position = Vec3::new(x, terrain.sample(x, z), z);
                *velocity = Vec3::ZERO;
                *frozen = true;
                Some(i)
            }
        })
        .collect()
}
