//! Persisted record layouts

use catchflow_core::{GeoTransform, CRS};
use catchflow_hydro::ElevationHistogram;
use geo::{LineString, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Bumped whenever any layout below changes
pub const FORMAT_VERSION: u32 = 1;

/// Snapshot-wide metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crs: Option<CRS>,
    pub threshold_cells: u32,
    pub cell_count: u64,
    pub segment_count: usize,
    pub catchment_count: usize,
}

/// One valid raster cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRecord {
    /// Flat index `row * cols + col`
    pub id: u64,
    /// Cell center
    pub x: f64,
    pub y: f64,
    pub elevation: f64,
    pub accumulation: u32,
    pub slope_percent: f64,
    pub downstream_id: Option<u64>,
    pub cell_area: f64,
    pub is_stream: bool,
    pub strahler_order: Option<u8>,
    /// Catchment (segment) the cell drains into
    pub catchment_id: Option<u32>,
}

/// One traced stream segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: u32,
    pub geometry: LineString<f64>,
    pub strahler_order: u8,
    pub length: f64,
    pub upstream_area: f64,
    pub upstream_cells: u32,
    pub mean_slope_percent: f64,
    pub threshold_used: u32,
    pub source_tag: String,
    pub head_cell: u64,
    pub outlet_cell: u64,
    pub head_elevation: f64,
    pub outlet_elevation: f64,
    pub downstream_segment_id: Option<u32>,
    pub upstream_segment_ids: Vec<u32>,
}

/// Incremental drainage area of one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentRecord {
    pub id: u32,
    pub geometry: MultiPolygon<f64>,
    pub segment_id: u32,
    pub threshold_used: u32,
    pub area: f64,
    pub cell_count: u64,
    pub mean_elevation: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub mean_slope_percent: f64,
    pub perimeter: f64,
    pub stream_length: f64,
    pub downstream_segment_id: Option<u32>,
    pub elevation_histogram: ElevationHistogram,
}
