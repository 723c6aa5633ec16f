//! # catchflow engine
//!
//! Runtime side of catchflow. A [`Snapshot`] bundles the per-cell table,
//! the stream segments and the [`CatchmentGraph`] produced by one
//! preprocessing run; [`LiveSnapshot`] publishes it atomically and the
//! [`WatershedQueryEngine`] answers bounded "what drains to this point"
//! queries against whichever snapshot is current.
//!
//! ```no_run
//! use catchflow_core::{GeoTransform, InMemorySource};
//! use catchflow_engine::{EngineConfig, LiveSnapshot, TraversalMode, WatershedQueryEngine};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let source = InMemorySource::new(vec![0.0; 100], 10, 10, GeoTransform::default());
//! let live = Arc::new(LiveSnapshot::build(&source, &config.pipeline)?);
//! let engine = WatershedQueryEngine::new(live, config.query);
//! let result = engine.query(5.0, -5.0, TraversalMode::Full)?;
//! println!("{} m2 over {} catchments", result.area, result.catchment_ids.len());
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod catchment_graph;
pub mod config;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod query;
pub mod runoff;
pub mod snapshot;
mod spatial_index;
pub mod store;

pub use catchment_graph::{Aggregate, CatchmentGraph, TraversalMode, UpstreamWalk, NO_PARENT};
pub use config::{EngineConfig, QueryConfig};
pub use error::{Error, QueryError, Resource, Result};
pub use guard::ResourceGuard;
pub use pipeline::build_snapshot;
pub use query::{QueryState, QueryStats, QueryStatsSnapshot, WatershedQueryEngine, WatershedResult};
pub use runoff::{RunoffInputs, RunoffModel};
pub use snapshot::{CellTable, LiveSnapshot, Snapshot};
pub use store::{CatchmentRecord, CellRecord, DirectoryStore, GraphStore, Manifest, SegmentRecord};
