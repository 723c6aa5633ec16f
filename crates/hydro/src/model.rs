//! Full preprocessing run
//!
//! Stages run strictly in order: filling must be complete before
//! accumulation reads the directions, and accumulation before streams and
//! labels. Any stage failing aborts the run.

use crate::basins::{catchment_statistics, label_basins, CatchmentStats};
use crate::flow_accumulation::{flow_accumulation, Accumulation};
use crate::flow_graph::FlowGraph;
use crate::histogram::HistogramParams;
use crate::polygonize::polygonize_labels;
use crate::priority_flood::{fill_depressions, FillParams, FlowRouting};
use crate::slope::slope_percent;
use crate::stream_network::{classify_streams, StreamNetwork, StreamParams};
use crate::vectorize::{vectorize_streams, StreamSegments};
use catchflow_core::source::ElevationGrid;
use catchflow_core::{Result, CRS};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Parameters for every preprocessing stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    pub fill: FillParams,
    pub streams: StreamParams,
    pub histogram: HistogramParams,
}

/// Everything derived from one elevation grid
#[derive(Debug, Clone)]
pub struct DrainageModel {
    pub routing: FlowRouting,
    pub graph: FlowGraph,
    pub accumulation: Accumulation,
    pub slope: catchflow_core::Raster<f64>,
    pub network: StreamNetwork,
    pub streams: StreamSegments,
    /// Segment id each cell drains into, `NO_LABEL` elsewhere
    pub labels: Vec<u32>,
    /// Indexed by segment id
    pub catchments: Vec<CatchmentStats>,
    /// Incremental catchment polygon per segment id
    pub polygons: Vec<MultiPolygon<f64>>,
    pub crs: Option<CRS>,
}

impl DrainageModel {
    /// Run every stage on `grid`.
    pub fn build(grid: &ElevationGrid, params: &PreprocessParams) -> Result<Self> {
        let start = Instant::now();
        let dem = grid.raster();

        let routing = fill_depressions(dem, &params.fill)?;
        let graph = FlowGraph::from_routing(&routing)?;
        let accumulation = flow_accumulation(&graph)?;
        let slope = slope_percent(&routing.filled);
        let network = classify_streams(&graph, &accumulation, &params.streams)?;
        let streams = vectorize_streams(&graph, &accumulation, &network, &routing.filled, &slope)?;
        let labels = label_basins(&graph, &accumulation, &streams);
        let catchments = catchment_statistics(
            &labels,
            streams.len(),
            &routing.filled,
            &slope,
            params.histogram.bin_width,
        )?;
        let polygons = polygonize_labels(
            &labels,
            graph.rows(),
            graph.cols(),
            streams.len(),
            routing.filled.transform(),
        )?;

        info!(
            cells = graph.valid_count(),
            segments = streams.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "drainage model built"
        );

        Ok(Self {
            routing,
            graph,
            accumulation,
            slope,
            network,
            streams,
            labels,
            catchments,
            polygons,
            crs: grid.crs().cloned(),
        })
    }

    /// Cell size in CRS units
    pub fn cell_size(&self) -> f64 {
        self.routing.filled.cell_size()
    }
}
