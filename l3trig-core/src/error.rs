//! Error types for l3trig-core.

use thiserror::Error;

/// Result type alias for l3trig operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of detector cell addressed by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Drift-chamber layer.
    Layer,
    /// Drift-chamber sense wire.
    Wire,
    /// Calorimeter crystal.
    Crystal,
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Layer => "layer",
            Self::Wire => "wire",
            Self::Crystal => "crystal",
        };
        f.write_str(name)
    }
}

/// Core error types for l3trig operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A requested cell lies outside the built lattice.
    #[error("{kind} id {id} is outside the lattice (size {size})")]
    CellOutOfRange {
        kind: CellKind,
        id: usize,
        size: usize,
    },

    /// Geometry could not be built from the configuration.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
