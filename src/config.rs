use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::constants::{kernel, particles, physics, terrain, thermal, time};
use crate::error::{invalid_config, SimResult, SimulationErrorContext};

/// Smoothing applied to the deposited terrain before it is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    #[default]
    None,
    /// 3x3 box filter
    Box,
    /// 5x5 Gaussian (1/273) filter
    Gaussian,
}

/// Full simulation configuration, loadable from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Kernel support radius H
    pub kernel_radius: f32,
    /// Fixed simulation step
    pub dt: f32,
    pub stiffness: f32,
    pub gravity: f32,
    pub rest_density: f32,
    pub spike: f32,
    pub smoothing: Smoothing,
    pub mu: f32,
    pub ke: f32,
    pub theta_e: f32,
    pub theta_a: f32,
    pub max_particles: usize,
    pub spawn_jitter: f32,
    pub spawn_per_step: usize,
    pub particle_mass: f32,
    pub particle_height: f32,
    pub max_neighbours_per_cell: usize,
    pub max_neighbours_per_particle: usize,
    pub max_substeps: usize,
    /// Fraction of the previous deposit kept by cells no particle touched
    pub terrain_recovery: f32,
    /// Swap-remove particles that leave the terrain instead of freezing them
    pub remove_out_of_bounds: bool,
    /// Worker threads for the particle passes, 0 = one per core
    pub worker_threads: usize,
    pub seed: u64,
    /// Terrain extent along x and z
    pub domain_size: [f32; 2],
    /// Grayscale-to-height multiplier used by the heightmap loader
    pub height_scale: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            kernel_radius: kernel::KERNEL_RADIUS,
            dt: time::DT,
            stiffness: physics::STIFFNESS,
            gravity: physics::GRAVITY,
            rest_density: physics::RHO_0,
            spike: terrain::SPIKE,
            smoothing: Smoothing::None,
            mu: thermal::MU,
            ke: thermal::KE,
            theta_e: thermal::THETA_E,
            theta_a: thermal::THETA_A,
            max_particles: particles::MAX_PARTICLES,
            spawn_jitter: particles::SPAWN_JITTER,
            spawn_per_step: particles::SPAWN_PER_STEP,
            particle_mass: particles::PARTICLE_MASS,
            particle_height: particles::PARTICLE_HEIGHT,
            max_neighbours_per_cell: kernel::MAX_NEIGHBOURS_PER_CELL,
            max_neighbours_per_particle: kernel::MAX_NEIGHBOURS_PER_PARTICLE,
            max_substeps: time::MAX_SUBSTEPS,
            terrain_recovery: terrain::RECOVERY,
            remove_out_of_bounds: false,
            worker_threads: 0,
            seed: particles::SEED,
            domain_size: terrain::DOMAIN_SIZE,
            height_scale: terrain::HEIGHT_SCALE,
        }
    }
}

impl SimulationConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .sim_context(&format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&source)?;
        log::info!("Loaded simulation config from {}", path.display());
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> SimResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the solver cannot run with
    pub fn validate(&self) -> SimResult<()> {
        positive("kernel_radius", self.kernel_radius)?;
        positive("dt", self.dt)?;
        positive("stiffness", self.stiffness)?;
        positive("rest_density", self.rest_density)?;
        positive("particle_mass", self.particle_mass)?;
        positive("domain_size[0]", self.domain_size[0])?;
        positive("domain_size[1]", self.domain_size[1])?;
        non_negative("gravity", self.gravity)?;
        non_negative("spike", self.spike)?;
        non_negative("mu", self.mu)?;
        non_negative("ke", self.ke)?;
        non_negative("spawn_jitter", self.spawn_jitter)?;
        non_negative("particle_height", self.particle_height)?;
        non_negative("height_scale", self.height_scale)?;

        if self.max_particles == 0 {
            return Err(invalid_config("max_particles", "must be at least 1"));
        }
        if self.max_neighbours_per_cell == 0 {
            return Err(invalid_config("max_neighbours_per_cell", "must be at least 1"));
        }
        if self.max_neighbours_per_particle == 0 {
            return Err(invalid_config("max_neighbours_per_particle", "must be at least 1"));
        }
        if self.max_substeps == 0 {
            return Err(invalid_config("max_substeps", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.terrain_recovery) {
            return Err(invalid_config("terrain_recovery", "must be within [0, 1]"));
        }
        if !self.theta_e.is_finite() || !self.theta_a.is_finite() {
            return Err(invalid_config("theta_e", "temperatures must be finite"));
        }
        if self.theta_e < self.theta_a {
            return Err(invalid_config(
                "theta_e",
                format!("extrusion temperature {} is below ambient {}", self.theta_e, self.theta_a),
            ));
        }
        self.check_buffers(Vec2::from(self.domain_size))
    }

    /// Reject configs whose neighbour grid over `domain_size` or whose
    /// per-particle neighbour lists would exceed `MAX_BUFFER_SLOTS` ids
    pub fn check_buffers(&self, domain_size: Vec2) -> SimResult<()> {
        let max = kernel::MAX_BUFFER_SLOTS as f64;

        let cell_size = (self.kernel_radius * kernel::CELL_SIZE_FACTOR) as f64;
        let cols = (domain_size.x as f64 / cell_size).ceil().max(1.0);
        let lines = (domain_size.y as f64 / cell_size).ceil().max(1.0);
        let grid_slots = cols * lines * self.bucket_capacity() as f64;
        if !(grid_slots <= max) {
            return Err(invalid_config(
                "kernel_radius",
                format!(
                    "{} is too small for a {}x{} domain: the neighbour grid would need {:.0} slots (limit {})",
                    self.kernel_radius,
                    domain_size.x,
                    domain_size.y,
                    grid_slots,
                    kernel::MAX_BUFFER_SLOTS
                ),
            ));
        }

        let list_slots = self.max_particles as f64 * self.max_neighbours_per_particle.max(1) as f64;
        if !(list_slots <= max) {
            return Err(invalid_config(
                "max_neighbours_per_particle",
                format!(
                    "{} particles x {} neighbours exceeds {} slots",
                    self.max_particles,
                    self.max_neighbours_per_particle,
                    kernel::MAX_BUFFER_SLOTS
                ),
            ));
        }
        Ok(())
    }

    /// Bucket capacity actually used by the neighbour grid
    pub fn bucket_capacity(&self) -> usize {
        self.max_neighbours_per_cell.min(self.max_particles).max(1)
    }

    /// The subset of fields an editor may change while the simulation runs
    pub fn tunables(&self) -> Tunables {
        Tunables {
            dt: self.dt,
            kernel_radius: self.kernel_radius,
            stiffness: self.stiffness,
            spike: self.spike,
            smoothing: self.smoothing,
            mu: self.mu,
            ke: self.ke,
            theta_e: self.theta_e,
            spawn_jitter: self.spawn_jitter,
        }
    }
}

/// Parameters that can be changed between frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    pub dt: f32,
    pub kernel_radius: f32,
    pub stiffness: f32,
    pub spike: f32,
    pub smoothing: Smoothing,
    pub mu: f32,
    pub ke: f32,
    pub theta_e: f32,
    pub spawn_jitter: f32,
}

impl Tunables {
    /// Copy these values over `config`, validating the result
    pub fn apply_to(&self, config: &SimulationConfig) -> SimResult<SimulationConfig> {
        let mut next = config.clone();
        next.dt = self.dt;
        next.kernel_radius = self.kernel_radius;
        next.stiffness = self.stiffness;
        next.spike = self.spike;
        next.smoothing = self.smoothing;
        next.mu = self.mu;
        next.ke = self.ke;
        next.theta_e = self.theta_e;
        next.spawn_jitter = self.spawn_jitter;
        next.validate()?;
        Ok(next)
    }
}

fn positive(field: &str, value: f32) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid_config(field, format!("must be a positive finite number, got {}", value)))
    }
}

fn non_negative(field: &str, value: f32) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid_config(field, format!("must be a non-negative finite number, got {}", value)))
    }
}
