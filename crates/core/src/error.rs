//! Error types for catchflow

use thiserror::Error;

/// Main error type for raster ingestion and preprocessing.
///
/// The first group of variants are input errors: the raster or a coordinate
/// was rejected before any computation ran. `Inconsistent` means a drainage
/// invariant was violated (cycle, dangling downstream reference) and the
/// result must not be published.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid coordinate ({x}, {y}): {reason}")]
    InvalidCoordinate { x: f64, y: f64, reason: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Drainage graph inconsistent: {0}")]
    Inconsistent(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error rejected the caller's input rather than exposing a
    /// broken invariant.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Error::Inconsistent(_) | Error::Io(_) | Error::Other(_))
    }
}

/// Result type alias for catchflow operations
pub type Result<T> = std::result::Result<T, Error>;
