//! Error types for the engine.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which ceiling a query ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Upstream raster cells
    Cells,
    /// Catchment graph nodes visited
    Nodes,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Cells => write!(f, "cells"),
            Resource::Nodes => write!(f, "nodes"),
        }
    }
}

/// Typed query failures. No partial watershed accompanies any of them.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed or out-of-range input, rejected before any work
    #[error("invalid query input: {0}")]
    Input(#[from] catchflow_core::Error),

    #[error("no stream cell within {radius} of ({x}, {y})")]
    NotFound { x: f64, y: f64, radius: f64 },

    #[error("watershed too large: {estimated} {resource} exceeds ceiling of {ceiling}")]
    TooLarge {
        resource: Resource,
        estimated: u64,
        ceiling: u64,
    },

    #[error("query timed out after {elapsed:?} (budget {budget:?})")]
    Timeout { elapsed: Duration, budget: Duration },

    /// The published graph broke an invariant; the snapshot should be rebuilt
    #[error("catchment graph inconsistent: {0}")]
    Inconsistent(String),
}

/// Preprocessing, publishing and persistence failures
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] catchflow_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        Error::Core(catchflow_core::Error::Inconsistent(msg.into()))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
