//! Smoothed-particle lava: kernels, neighbour search, particle storage and the solver

pub mod emitter;
pub mod fields;
pub mod integration;
pub mod kernels;
pub mod neighbor_grid;
pub mod particle_data;
pub mod solver;

pub use emitter::LavaEmitter;
pub use fields::{FieldParams, NeighborLists};
pub use integration::StepClock;
pub use kernels::{KernelCoefficients, SphKernel};
pub use neighbor_grid::{CellCoord, NeighborGrid, NeighborGridStats};
pub use particle_data::{prepare_render_data, Particle, ParticleInit, ParticleRenderData, ParticleStore, NO_CELL};
pub use solver::{SimulationContext, SimulationStats, Solver, StepReport};
