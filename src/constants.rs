// Lava SPH Constants - SINGLE SOURCE OF TRUTH
//
// Default values for every tunable of the simulation. `SimulationConfig::default()`
// is built from these, so change them here and nowhere else.

/// Physical constants
pub mod physics {
    /// Pi, kept at the precision the kernel coefficients were tuned with
    pub const PI: f32 = std::f32::consts::PI;

    /// Gravitational acceleration (m/s²)
    pub const GRAVITY: f32 = 9.81;

    /// Lava rest density (kg/m³)
    pub const RHO_0: f32 = 2500.0;

    /// Divides gravity in the overdamped velocity law
    pub const STIFFNESS: f32 = 3.0;
}

/// SPH kernel defaults
pub mod kernel {
    /// Smoothing (support) radius H
    pub const KERNEL_RADIUS: f32 = 5.0;

    /// Neighbour grid cells are this many kernel radii wide
    pub const CELL_SIZE_FACTOR: f32 = 2.0;

    /// Upper bound of ids stored per neighbour-grid bucket
    pub const MAX_NEIGHBOURS_PER_CELL: usize = 1024;

    /// Upper bound of neighbours kept per particle
    pub const MAX_NEIGHBOURS_PER_PARTICLE: usize = 256;

    /// Largest id buffer (grid buckets or neighbour lists) a config may ask for, 1 GiB of u32
    pub const MAX_BUFFER_SLOTS: usize = 1 << 28;
}

/// Thermal model defaults (Kelvin)
pub mod thermal {
    /// Extrusion temperature, new particles are born at this temperature
    pub const THETA_E: f32 = 1400.0;

    /// Ambient temperature lava cools toward
    pub const THETA_A: f32 = 300.0;

    /// Lava viscosity constant: viscosity sensitivity to undercooling (1/K)
    pub const MU: f32 = 0.004;

    /// Lava initial viscosity constant: scales heat exchange between neighbours,
    /// and `MU * KE` is the relaxation rate toward ambient (1/s)
    pub const KE: f32 = 5.0;
}

/// Time stepping defaults
pub mod time {
    /// Fixed simulation step (s)
    pub const DT: f32 = 0.01;

    /// Most sub-steps a single frame may trigger
    pub const MAX_SUBSTEPS: usize = 10;

    /// Step count substituted when the accumulator produces a NaN count
    pub const NAN_STEP_FALLBACK: usize = 0;
}

/// Particle lifecycle defaults
pub mod particles {
    /// Maximum number of particles
    pub const MAX_PARTICLES: usize = 50_000;

    /// Radius of the disc around the generator where particles spawn
    pub const SPAWN_JITTER: f32 = 1.0;

    /// Particles emitted per fixed step
    pub const SPAWN_PER_STEP: usize = 1;

    /// Lava mass carried by one particle (kg)
    pub const PARTICLE_MASS: f32 = 2500.0;

    /// Base lava column height of a freshly spawned particle
    pub const PARTICLE_HEIGHT: f32 = 2.0;

    /// Default jitter seed
    pub const SEED: u64 = 0x1a7a_5eed;
}

/// Terrain defaults
pub mod terrain {
    /// World extent of the terrain along x and z
    pub const DOMAIN_SIZE: [f32; 2] = [512.0, 512.0];

    /// Grayscale [0, 1] is multiplied by this to obtain heights
    pub const HEIGHT_SCALE: f32 = 32.0;

    /// Scale from deposited lava height to rendered elevation
    pub const SPIKE: f32 = 0.1;

    /// Fraction of the previous deposit an untouched cell keeps each tick
    pub const RECOVERY: f32 = 0.0;

    /// 5x5 Gaussian blur weights (sum 273)
    pub const GAUSSIAN_5X5: [[f32; 5]; 5] = [
        [1.0, 4.0, 7.0, 4.0, 1.0],
        [4.0, 16.0, 26.0, 16.0, 4.0],
        [7.0, 26.0, 41.0, 26.0, 7.0],
        [4.0, 16.0, 26.0, 16.0, 4.0],
        [1.0, 4.0, 7.0, 4.0, 1.0],
    ];
}
