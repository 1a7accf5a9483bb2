//! Per-particle SPH field passes
//!
//! Each pass reads the state committed by the previous pass and gathers its
//! result into a scratch buffer before committing it, so a particle never sees
//! a neighbour's half-updated value. Only the first `n` particles take part;
//! particles spawned during the tick join on the next one. Frozen particles keep
//! their committed values.

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::kernels::SphKernel;
use super::neighbor_grid::NeighborGrid;
use super::particle_data::ParticleStore;
use crate::config::SimulationConfig;
use crate::terrain::StaggeredGrid;

/// Physical parameters read by the field passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldParams {
    pub kernel: SphKernel,
    pub rest_density: f32,
    pub dt: f32,
    pub gravity: f32,
    pub stiffness: f32,
    pub mu: f32,
    pub ke: f32,
    pub theta_e: f32,
    pub theta_a: f32,
}

impl FieldParams {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            kernel: SphKernel::new(config.kernel_radius),
            rest_density: config.rest_density,
            dt: config.dt,
            gravity: config.gravity,
            stiffness: config.stiffness,
            mu: config.mu,
            ke: config.ke,
            theta_e: config.theta_e,
            theta_a: config.theta_a,
        }
    }

    /// Thermal relaxation rate (1/s): viscosity constant times initial viscosity constant
    #[inline]
    pub fn relaxation_rate(&self) -> f32 {
        self.mu * self.ke
    }

    /// Inverse relative viscosity of lava at `temperature`, 1 at the extrusion temperature
    #[inline]
    pub fn fluidity(&self, temperature: f32) -> f32 {
        (-self.mu * (self.theta_e - temperature).max(0.0)).exp()
    }
}

/// Flat per-particle neighbour lists, `max_neighbours` slots per particle
#[derive(Debug, Clone)]
pub struct NeighborLists {
    max_neighbours: usize,
    ids: Vec<u32>,
    counts: Vec<u32>,
}

impl NeighborLists {
    pub fn new(capacity: usize, max_neighbours: usize) -> Self {
        let max_neighbours = max_neighbours.max(1);
        Self {
            max_neighbours,
            ids: vec![0; capacity * max_neighbours],
            counts: vec![0; capacity],
        }
    }

    pub fn max_neighbours(&self) -> usize {
        self.max_neighbours
    }

    /// Neighbours of particle `i` found by the last `update_neighbours`
    #[inline]
    pub fn neighbours(&self, i: usize) -> &[u32] {
        let start = i * self.max_neighbours;
        &self.ids[start..start + self.counts[i] as usize]
    }

    /// (sum, max) of the first `n` list lengths
    pub fn totals(&self, n: usize) -> (usize, usize) {
        self.counts[..n]
            .iter()
            .fold((0, 0), |(sum, max), &c| (sum + c as usize, max.max(c as usize)))
    }
}

/// Reusable gather buffers
#[derive(Debug, Default, Clone)]
pub struct FieldScratch {
    pub scalars: Vec<f32>,
    pub vectors: Vec<Vec3>,
}

/// Refresh neighbour lists from the grid with the exact distance test
pub fn update_neighbours(store: &ParticleStore, grid: &NeighborGrid, lists: &mut NeighborLists, radius: f32, n: usize) {
    let NeighborLists {
        max_neighbours,
        ids,
        counts,
    } = lists;
    let max = *max_neighbours;
    let positions = &store.positions;
    let cells = &store.cell_indices;
    let r2 = radius * radius;

    ids[..n * max]
        .par_chunks_mut(max)
        .zip(counts[..n].par_iter_mut())
        .enumerate()
        .for_each_init(Vec::new, |candidates, (i, (slots, count))| {
            *count = 0;
            let Ok(cell) = usize::try_from(cells[i]) else {
                return;
            };

            grid.query_candidates(cell, candidates, usize::MAX);
            let p = positions[i];
            let mut found = 0;
            for &j in candidates.iter() {
                let j = j as usize;
                if j == i || j >= n {
                    continue;
                }
                if SphKernel::offset(p, positions[j]).length_squared() < r2 {
                    if found == max {
                        break;
                    }
                    slots[found] = j as u32;
                    found += 1;
                }
            }
            *count = found as u32;
        });
}

/// `ρ_i = Σ m_j W(r_ij)` including the particle itself; `V_i = m_i / ρ_i`
pub fn update_densities(
    store: &mut ParticleStore,
    lists: &NeighborLists,
    kernel: &SphKernel,
    scratch: &mut FieldScratch,
    n: usize,
) {
    let positions = &store.positions;
    let masses = &store.masses;
    let densities = &store.densities;
    let frozen = &store.frozen;
    (0..n)
        .into_par_iter()
        .map(|i| {
            if frozen[i] {
                return densities[i];
            }
            let p = positions[i];
            lists.neighbours(i).iter().fold(masses[i] * kernel.w_zero(), |rho, &j| {
                let j = j as usize;
                rho + masses[j] * kernel.w(p, positions[j])
            })
        })
        .collect_into_vec(&mut scratch.scalars);

    store.densities[..n]
        .par_iter_mut()
        .zip(store.volumes[..n].par_iter_mut())
        .zip(store.masses[..n].par_iter())
        .zip(scratch.scalars.par_iter())
        .for_each(|(((density, volume), &mass), &rho)| {
            // Degenerate sums keep the previous density and volume
            if rho.is_finite() && rho > 0.0 {
                *density = rho;
                *volume = mass / rho;
            }
        });
}

/// Lava column height `h_i = Σ V_j (ρ_j / ρ₀) W(r_ij)`, self term included
pub fn update_heights(
    store: &mut ParticleStore,
    lists: &NeighborLists,
    params: &FieldParams,
    scratch: &mut FieldScratch,
    n: usize,
) {
    let kernel = &params.kernel;
    let inv_rest = 1.0 / params.rest_density;
    let positions = &store.positions;
    let volumes = &store.volumes;
    let densities = &store.densities;
    let heights = &store.heights;
    let frozen = &store.frozen;
    (0..n)
        .into_par_iter()
        .map(|i| {
            if frozen[i] {
                return heights[i];
            }
            let p = positions[i];
            let own = volumes[i] * densities[i] * inv_rest * kernel.w_zero();
            lists.neighbours(i).iter().fold(own, |h, &j| {
                let j = j as usize;
                h + volumes[j] * densities[j] * inv_rest * kernel.w(p, positions[j])
            })
        })
        .collect_into_vec(&mut scratch.scalars);

    commit_finite(&mut store.heights[..n], &scratch.scalars);
}

/// `∇h_i = Σ V_j (h_j - h_i) ∇W(x_i, x_j)`, zero without neighbours
pub fn update_height_gradients(
    store: &mut ParticleStore,
    lists: &NeighborLists,
    kernel: &SphKernel,
    scratch: &mut FieldScratch,
    n: usize,
) {
    let positions = &store.positions;
    let volumes = &store.volumes;
    let heights = &store.heights;
    let gradients = &store.height_gradients;
    let frozen = &store.frozen;
    (0..n)
        .into_par_iter()
        .map(|i| {
            if frozen[i] {
                return gradients[i];
            }
            let p = positions[i];
            let h = heights[i];
            let grad = lists.neighbours(i).iter().fold(Vec3::ZERO, |acc, &j| {
                let j = j as usize;
                acc + volumes[j] * (heights[j] - h) * kernel.grad_w(p, positions[j])
            });
            if grad.is_finite() {
                grad
            } else {
                Vec3::ZERO
            }
        })
        .collect_into_vec(&mut scratch.vectors);

    store.height_gradients[..n].copy_from_slice(&scratch.vectors);
}

/// Free-surface slope: base terrain gradient plus the lava height gradient
#[inline]
pub fn surface_slope(staggered: &StaggeredGrid, position: Vec3, height_gradient: Vec3) -> Vec3 {
    let terrain = staggered.gradient_at(position.x, position.z);
    Vec3::new(terrain.x + height_gradient.x, 0.0, terrain.y + height_gradient.z)
}

/// Surface gradient of particle `i`
pub fn surface_gradient(store: &ParticleStore, staggered: &StaggeredGrid, i: usize) -> Vec3 {
    surface_slope(staggered, store.positions[i], store.height_gradients[i])
}

/// Heat exchange between neighbours, then exponential relaxation toward the ambient temperature
///
/// Both are governed by the lava constants: `Ke` scales the exchange and
/// `Mu · Ke` is the relaxation rate, so lava with `Mu = Ke = 0` holds its
/// temperature.
pub fn update_temperatures(
    store: &mut ParticleStore,
    lists: &NeighborLists,
    params: &FieldParams,
    scratch: &mut FieldScratch,
    n: usize,
) {
    let kernel = &params.kernel;
    let decay = (-params.relaxation_rate() * params.dt).exp();
    let positions = &store.positions;
    let volumes = &store.volumes;
    let temperatures = &store.temperatures;
    let frozen = &store.frozen;
    (0..n)
        .into_par_iter()
        .map(|i| {
            let t = temperatures[i];
            if frozen[i] {
                return t;
            }
            let p = positions[i];
            let exchange = lists.neighbours(i).iter().fold(0.0, |acc, &j| {
                let j = j as usize;
                acc + volumes[j] * (temperatures[j] - t) * kernel.viscosity_laplacian_w(p, positions[j])
            });

            let diffused = t + params.dt * params.ke * exchange;
            let cooled = params.theta_a + (diffused - params.theta_a) * decay;
            if cooled.is_finite() {
                cooled.clamp(params.theta_a, params.theta_e.max(t))
            } else {
                t
            }
        })
        .collect_into_vec(&mut scratch.scalars);

    commit_finite(&mut store.temperatures[..n], &scratch.scalars);
}

/// Overdamped gravity-driven flow `v = -(G / stiffness) · fluidity(T) · ∇s`
pub fn update_velocities(store: &mut ParticleStore, staggered: &StaggeredGrid, params: &FieldParams, n: usize) {
    let scale = -params.gravity / params.stiffness;
    let positions = &store.positions;
    let gradients = &store.height_gradients;
    let temperatures = &store.temperatures;
    let frozen = &store.frozen;

    store.velocities[..n].par_iter_mut().enumerate().for_each(|(i, v)| {
        if frozen[i] {
            *v = Vec3::ZERO;
            return;
        }
        let slope = surface_slope(staggered, positions[i], gradients[i]);
        let next = scale * params.fluidity(temperatures[i]) * slope;
        *v = if next.is_finite() { next } else { Vec3::ZERO };
    });
}

/// Horizontal speed of the velocity field, for stats
pub fn max_speed(store: &ParticleStore) -> f32 {
    store
        .velocities()
        .par_iter()
        .map(|v| Vec2::new(v.x, v.z).length())
        .reduce(|| 0.0, f32::max)
}

fn commit_finite(target: &mut [f32], values: &[f32]) {
    target
        .par_iter_mut()
        .zip(values.par_iter())
        .for_each(|(slot, &value)| {
            if value.is_finite() {
                *slot = value;
            }
        });
}
