/// Simulation Error Handling
///
/// Errors only surface while building a simulation (config, terrain loading).
/// Once a `Solver` exists every per-particle failure mode is recovered locally.

/// Simulation errors
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Heightmap error: {0}")]
    Heightmap(#[from] image::ImageError),

    #[error("Terrain must have at least 2x2 nodes, got {lines}x{cols}")]
    EmptyTerrain { lines: usize, cols: usize },

    #[error("Dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{component}: {error}")]
    SystemError { component: String, error: String },
}

/// Simulation result type
pub type SimResult<T> = Result<T, SimulationError>;

/// Error context for simulation operations
pub trait SimulationErrorContext<T> {
    fn sim_context(self, context: &str) -> SimResult<T>;
}

impl<T, E> SimulationErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn sim_context(self, context: &str) -> SimResult<T> {
        self.map_err(|e| SimulationError::SystemError {
            component: "lava_sph".to_string(),
            error: format!("{}: {}", context, e),
        })
    }
}

/// Create an invalid configuration error
pub fn invalid_config(field: &str, reason: impl std::fmt::Display) -> SimulationError {
    SimulationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
