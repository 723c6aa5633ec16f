//! # catchflow hydro
//!
//! Offline preprocessing that turns an elevation grid into drainage topology.
//!
//! Stages, in the order they must run:
//! - **conditioning**: pre-fill internal nodata holes
//! - **priority_flood**: depression filling and D8 direction assignment
//! - **flow_accumulation**: upstream cell counts in topological order
//! - **stream_network**: thresholding and Strahler ordering
//! - **vectorize**: stream cells traced into segments
//! - **basins**: every cell labeled with the segment it drains into
//!
//! [`DrainageModel::build`] runs them all; each stage is also usable on its own.

pub mod basins;
pub mod conditioning;
pub mod flow_accumulation;
pub mod flow_graph;
pub mod histogram;
pub mod model;
pub mod polygonize;
pub mod priority_flood;
mod residual;
mod rows;
pub mod slope;
pub mod stream_network;
pub mod vectorize;

pub use basins::{catchment_statistics, label_basins, CatchmentStats, NO_LABEL};
pub use conditioning::{fill_nodata_holes, HoleFillReport};
pub use flow_accumulation::{flow_accumulation, Accumulation, FlowAccumulator};
pub use flow_graph::{FlowGraph, NO_DOWNSTREAM};
pub use histogram::{ElevationHistogram, HistogramParams};
pub use model::{DrainageModel, PreprocessParams};
pub use polygonize::polygonize_labels;
pub use priority_flood::{fill_depressions, DepressionFiller, FillParams, FillReport, FlowRouting};
pub use slope::slope_percent;
pub use stream_network::{classify_streams, StreamClassifier, StreamNetwork, StreamParams};
pub use vectorize::{vectorize_streams, StreamSegment, StreamSegments, NO_SEGMENT};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        classify_streams, fill_depressions, flow_accumulation, label_basins, vectorize_streams,
        DrainageModel, FillParams, FlowGraph, PreprocessParams, StreamParams,
    };
    pub use catchflow_core::prelude::*;
}
