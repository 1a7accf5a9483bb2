/// Lava SPH solver
///
/// Owns the whole simulation state in a `SimulationContext` and advances it in
/// fixed steps. One tick runs:
/// neighbour grid rebuild, spawn, field passes, integration, out-of-bounds
/// handling, terrain deposition. The particle passes run on a dedicated rayon
/// pool; the grid insertion and the deposition scatter run in particle order.
use std::time::Instant;

use glam::Vec3;
use serde::Serialize;

use super::emitter::LavaEmitter;
use super::fields::{self, FieldParams, FieldScratch, NeighborLists};
use super::integration::{integrate, StepClock};
use super::neighbor_grid::{NeighborGrid, NeighborGridStats};
use super::particle_data::{Particle, ParticleInit, ParticleStore, NO_CELL};
use crate::config::{SimulationConfig, Tunables};
use crate::error::{SimResult, SimulationErrorContext};
use crate::terrain::{StaggeredGrid, TerrainDeposition, TerrainHeightField};

/// Everything a tick reads or writes, owned by value
pub struct SimulationContext {
    pub config: SimulationConfig,
    pub params: FieldParams,
    pub terrain: TerrainHeightField,
    pub staggered: StaggeredGrid,
    pub grid: NeighborGrid,
    pub particles: ParticleStore,
    pub neighbours: NeighborLists,
    pub deposition: TerrainDeposition,
    pub emitter: LavaEmitter,
    scratch: FieldScratch,
}

impl SimulationContext {
    pub fn new(terrain: TerrainHeightField, config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        config.check_buffers(terrain.size())?;

        let staggered = StaggeredGrid::new(&terrain);
        let grid = NeighborGrid::new(terrain.size(), config.kernel_radius, config.bucket_capacity());
        let particles = ParticleStore::new(config.max_particles);
        let neighbours = NeighborLists::new(config.max_particles, config.max_neighbours_per_particle);
        let deposition = TerrainDeposition::new(&terrain, config.theta_a);
        let emitter = LavaEmitter::new(config.spawn_jitter, config.seed);

        Ok(Self {
            params: FieldParams::from_config(&config),
            config,
            terrain,
            staggered,
            grid,
            particles,
            neighbours,
            deposition,
            emitter,
            scratch: FieldScratch::default(),
        })
    }

    /// Particle template for a spawn at `position`
    fn spawn_init(&self, position: Vec3) -> ParticleInit {
        ParticleInit {
            position,
            mass: self.config.particle_mass,
            density: self.config.rest_density,
            height: self.config.particle_height,
            temperature: self.config.theta_e,
        }
    }
}

/// What one call to `step` or `tick` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub steps: usize,
    pub spawned: usize,
    pub spawns_ignored: usize,
    pub frozen: usize,
    pub removed: usize,
    pub live_particles: usize,
}

impl StepReport {
    fn merge(&mut self, other: StepReport) {
        self.steps += other.steps;
        self.spawned += other.spawned;
        self.spawns_ignored += other.spawns_ignored;
        self.frozen += other.frozen;
        self.removed += other.removed;
        self.live_particles = other.live_particles;
    }
}

/// Running statistics of a simulation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationStats {
    pub ticks: u64,
    pub simulated_time: f64,
    pub particles_spawned: u64,
    pub spawns_ignored: u64,
    pub particles_frozen: u64,
    pub particles_removed: u64,
    pub live_particles: usize,
    /// Grid inserts dropped by full buckets, summed over all ticks
    pub overflowed_inserts: u64,
    pub average_neighbours: f32,
    pub max_neighbours: usize,
    pub max_speed: f32,
    pub total_lava_height: f64,
    pub last_tick_us: u64,
    pub total_tick_us: u64,
    pub grid: NeighborGridStats,
}

pub struct Solver {
    context: SimulationContext,
    clock: StepClock,
    pool: rayon::ThreadPool,
    stats: SimulationStats,
    overflow_warned: bool,
}

impl Solver {
    /// Validate the config and build the simulation state
    pub fn initialize(terrain: TerrainHeightField, config: SimulationConfig) -> SimResult<Self> {
        let worker_threads = if config.worker_threads == 0 {
            num_cpus::get()
        } else {
            config.worker_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|idx| format!("lava-sph-{}", idx))
            .build()
            .sim_context("building particle worker pool")?;

        let clock = StepClock::new(config.dt, config.max_substeps);
        let context = SimulationContext::new(terrain, config)?;

        let (lines, cols) = context.terrain.dims();
        let (grid_lines, grid_cols) = context.grid.dimensions();
        log::info!(
            "Lava solver initialised: terrain {}x{}, neighbour grid {}x{}, {} particles max, H = {}, {} worker threads",
            lines,
            cols,
            grid_lines,
            grid_cols,
            context.config.max_particles,
            context.config.kernel_radius,
            worker_threads
        );

        Ok(Self {
            context,
            clock,
            pool,
            stats: SimulationStats::default(),
            overflow_warned: false,
        })
    }

    /// Advance by however many fixed steps `frame_dt` accumulates to
    ///
    /// Every step emits `spawn_per_step` particles around `generator_position`.
    pub fn step(&mut self, generator_position: Vec3, frame_dt: f32) -> StepReport {
        let steps = self.clock.advance(frame_dt);
        let mut report = StepReport {
            live_particles: self.context.particles.live_count(),
            ..Default::default()
        };
        for _ in 0..steps {
            report.merge(self.tick(Some(generator_position)));
        }
        report
    }

    /// Run exactly one fixed step, spawning only when a generator is given
    pub fn tick(&mut self, generator: Option<Vec3>) -> StepReport {
        let start = Instant::now();
        let mut report = StepReport {
            steps: 1,
            ..Default::default()
        };

        let n = self.rebuild_neighbor_grid();

        if let Some(generator) = generator {
            self.spawn(generator, &mut report);
        }

        let SimulationContext {
            config,
            params,
            terrain,
            staggered,
            grid,
            particles,
            neighbours,
            scratch,
            ..
        } = &mut self.context;

        let frozen = self.pool.install(|| {
            let kernel = params.kernel;
            fields::update_neighbours(particles, grid, neighbours, kernel.radius(), n);
            fields::update_densities(particles, neighbours, &kernel, scratch, n);
            fields::update_heights(particles, neighbours, params, scratch, n);
            fields::update_height_gradients(particles, neighbours, &kernel, scratch, n);
            fields::update_temperatures(particles, neighbours, params, scratch, n);
            fields::update_velocities(particles, staggered, params, n);
            integrate(particles, terrain, config.dt, n)
        });

        report.frozen = frozen.len();
        if config.remove_out_of_bounds {
            report.removed = self.remove_particles(&frozen);
        } else {
            for &i in &frozen {
                self.detach_from_grid(i);
            }
        }

        self.update_terrain();

        report.live_particles = self.context.particles.live_count();
        self.record_tick(&report, n, start);
        report
    }

    /// Reset the grid and insert every live, non-frozen particle in index order
    ///
    /// Returns the number of particles taking part in this tick.
    fn rebuild_neighbor_grid(&mut self) -> usize {
        let SimulationContext { grid, particles, .. } = &mut self.context;
        let n = particles.live_count();

        grid.reset();
        for i in 0..n {
            particles.cell_indices[i] = if particles.frozen[i] {
                NO_CELL
            } else {
                grid.insert(i as u32, particles.positions[i]).map_or(NO_CELL, |cell| cell as i32)
            };
        }

        let overflow = grid.overflow_count();
        if overflow > 0 {
            if self.overflow_warned {
                log::debug!("Neighbour grid dropped {} inserts this tick", overflow);
            } else {
                log::warn!(
                    "Neighbour grid buckets full ({} per cell), {} inserts dropped; neighbour search is truncated",
                    grid.max_per_cell(),
                    overflow
                );
                self.overflow_warned = true;
            }
        }
        self.stats.overflowed_inserts += overflow as u64;

        n
    }

    fn spawn(&mut self, generator: Vec3, report: &mut StepReport) {
        for _ in 0..self.context.config.spawn_per_step {
            if !self.context.particles.can_spawn() {
                report.spawns_ignored += 1;
                continue;
            }
            let mut position = self.context.emitter.sample(generator);
            position.y = self.context.terrain.sample(position.x, position.z);
            let init = self.context.spawn_init(position);
            if self.context.particles.spawn(init).is_some() {
                report.spawned += 1;
            }
        }

        if report.spawns_ignored > 0 {
            log::debug!(
                "Particle store full ({}), ignored {} spawns",
                self.context.particles.capacity(),
                report.spawns_ignored
            );
        }
    }

    /// Drop particle `i` from its grid bucket
    fn detach_from_grid(&mut self, i: usize) {
        let SimulationContext { grid, particles, .. } = &mut self.context;
        if let Ok(cell) = usize::try_from(particles.cell_indices[i]) {
            grid.remove(i as u32, cell);
        }
        particles.cell_indices[i] = NO_CELL;
    }

    /// Swap-remove the given particles, keeping the neighbour grid in sync
    fn remove_particles(&mut self, indices: &[usize]) -> usize {
        // Descending, so a swapped-in particle is never one still to remove
        for &i in indices.iter().rev() {
            self.detach_from_grid(i);

            let SimulationContext { grid, particles, .. } = &mut self.context;
            if let Some(moved) = particles.remove_swap(i) {
                if let Ok(cell) = usize::try_from(particles.cell_indices[i]) {
                    grid.relabel(moved as u32, i as u32, cell);
                }
            }
        }
        indices.len()
    }

    /// Scatter particles into the deposition buffer and rebuild the rendered terrain
    fn update_terrain(&mut self) {
        let SimulationContext {
            config,
            particles,
            deposition,
            ..
        } = &mut self.context;

        deposition.reset();
        // Frozen particles sit on the border and keep depositing their last height
        for i in 0..particles.live_count() {
            deposition.deposit(particles.positions[i], particles.heights[i], particles.temperatures[i]);
        }
        deposition.finalize(config.spike, config.terrain_recovery, config.smoothing);
    }

    fn record_tick(&mut self, report: &StepReport, n: usize, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        let (neighbour_sum, neighbour_max) = self.context.neighbours.totals(n);

        let stats = &mut self.stats;
        stats.ticks += 1;
        stats.simulated_time += self.context.config.dt as f64;
        stats.particles_spawned += report.spawned as u64;
        stats.spawns_ignored += report.spawns_ignored as u64;
        stats.particles_frozen += report.frozen as u64;
        stats.particles_removed += report.removed as u64;
        stats.live_particles = report.live_particles;
        stats.average_neighbours = if n > 0 { neighbour_sum as f32 / n as f32 } else { 0.0 };
        stats.max_neighbours = neighbour_max;
        stats.max_speed = fields::max_speed(&self.context.particles);
        stats.total_lava_height = self.context.deposition.total_deposited_height();
        stats.last_tick_us = elapsed_us;
        stats.total_tick_us += elapsed_us;
        stats.grid = self.context.grid.get_stats();

        log::debug!(
            "Tick {}: {} particles, {:.1} neighbours avg, max speed {:.3}, {}us",
            stats.ticks,
            stats.live_particles,
            stats.average_neighbours,
            stats.max_speed,
            elapsed_us
        );
    }

    /// Apply editor changes between frames
    ///
    /// A new kernel radius rederives the kernel coefficients and rebuilds the
    /// neighbour grid; the next tick refills it.
    pub fn apply_tunables(&mut self, tunables: Tunables) -> SimResult<()> {
        let next = tunables.apply_to(&self.context.config)?;
        next.check_buffers(self.context.terrain.size())?;
        let context = &mut self.context;

        if next.kernel_radius != context.config.kernel_radius {
            context.grid = NeighborGrid::new(context.terrain.size(), next.kernel_radius, next.bucket_capacity());
            for cell in context.particles.cell_indices.iter_mut() {
                *cell = NO_CELL;
            }
            log::info!(
                "Kernel radius changed {} -> {}, neighbour grid rebuilt",
                context.config.kernel_radius,
                next.kernel_radius
            );
        }

        self.clock.set_dt(next.dt);
        context.emitter.jitter = next.spawn_jitter;
        context.params = FieldParams::from_config(&next);
        context.config = next;
        Ok(())
    }

    /// Stop the simulation and hand back its statistics
    pub fn shutdown(self) -> SimulationStats {
        log::info!(
            "Lava solver shut down after {} ticks ({:.2}s simulated): {} particles live, {} spawned, {} frozen, {} removed",
            self.stats.ticks,
            self.stats.simulated_time,
            self.stats.live_particles,
            self.stats.particles_spawned,
            self.stats.particles_frozen,
            self.stats.particles_removed
        );
        self.stats
    }

    pub fn positions(&self) -> &[Vec3] {
        self.context.particles.positions()
    }

    pub fn velocities(&self) -> &[Vec3] {
        self.context.particles.velocities()
    }

    pub fn heights(&self) -> &[f32] {
        self.context.particles.heights()
    }

    pub fn temperatures(&self) -> &[f32] {
        self.context.particles.temperatures()
    }

    pub fn particle_count(&self) -> usize {
        self.context.particles.live_count()
    }

    pub fn particle(&self, index: usize) -> Option<Particle> {
        self.context.particles.particle(index)
    }

    /// Post-deposition terrain heights, row-major `terrain_dims()`
    pub fn terrain_heights(&self) -> &[f32] {
        self.context.deposition.heights()
    }

    pub fn terrain_temperatures(&self) -> &[f32] {
        self.context.deposition.temperatures()
    }

    /// (lines, cols)
    pub fn terrain_dims(&self) -> (usize, usize) {
        self.context.terrain.dims()
    }

    pub fn surface_gradient(&self, index: usize) -> Option<Vec3> {
        (index < self.particle_count())
            .then(|| fields::surface_gradient(&self.context.particles, &self.context.staggered, index))
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.context.config
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn clock(&self) -> &StepClock {
        &self.clock
    }
}
