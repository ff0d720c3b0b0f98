//! Error types for territoria.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TerritoryError>;

/// Errors surfaced by territory operations.
#[derive(Error, Debug)]
pub enum TerritoryError {
    /// Raw boundary data could not be assembled into usable geometry.
    #[error("Geometry assembly error: {0}")]
    GeometryAssembly(String),

    /// A hierarchy write would violate a structural rule.
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Caller-supplied value failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced territory does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
