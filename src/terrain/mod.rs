//! Terrain height field, its staggered derivatives, and the lava deposit layer

pub mod deposition;
pub mod height_field;
pub mod staggered_grid;

pub use deposition::TerrainDeposition;
pub use height_field::TerrainHeightField;
pub use staggered_grid::StaggeredGrid;
