//! Lava flow simulation over a terrain height field
//!
//! Particles carry lava mass, height and temperature; smoothed-particle
//! hydrodynamics reconstructs the lava surface from them and drives them
//! downhill along the terrain. The lava they leave behind is deposited back
//! into a terrain height buffer for rendering.

pub mod config;
pub mod constants;
pub mod error;
pub mod sph;
pub mod terrain;

pub use config::{SimulationConfig, Smoothing, Tunables};
pub use error::{SimResult, SimulationError, SimulationErrorContext};
pub use sph::{SimulationContext, SimulationStats, Solver, StepReport};
pub use terrain::{StaggeredGrid, TerrainDeposition, TerrainHeightField};
