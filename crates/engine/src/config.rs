//! Engine configuration
//!
//! Everything has a default, so a config file only needs the keys it
//! changes:
//!
//! ```json
//! { "pipeline": { "streams": { "threshold_cells": 500 } },
//!   "query": { "search_radius": 60.0, "timeout_ms": 2000 } }
//! ```

use crate::error::Result;
use catchflow_hydro::PreprocessParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Limits and tolerances for watershed queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum distance (CRS units) from the query point to a stream cell
    pub search_radius: f64,
    /// Hard ceiling on upstream cells, checked before and during traversal
    pub max_cells: u64,
    /// Hard ceiling on catchment nodes visited
    pub max_nodes: usize,
    /// Wall-clock budget per query
    pub timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_radius: 100.0,
            max_cells: 2_000_000,
            max_nodes: 100_000,
            timeout_ms: 30_000,
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: PreprocessParams,
    pub query: QueryConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
