//! Sub-catchment labeling
//!
//! Each valid cell gets the id of the stream segment it drains into. Stream
//! cells carry their own segment id; walking the topological order backwards
//! visits every cell after the cell it drains into, so a non-stream cell
//! copies its downstream neighbor's label in O(1). One pass, O(N).

use crate::flow_accumulation::Accumulation;
use crate::flow_graph::{FlowGraph, NO_DOWNSTREAM};
use crate::histogram::ElevationHistogram;
use crate::vectorize::{StreamSegments, NO_SEGMENT};
use catchflow_core::raster::Raster;
use catchflow_core::{Error, Result};
use std::time::Instant;
use tracing::info;

/// Label of cells that reach no stream (nodata, or basins below threshold)
pub const NO_LABEL: u32 = u32::MAX;

/// Propagate segment ids upstream over the flow graph.
pub fn label_basins(graph: &FlowGraph, acc: &Accumulation, streams: &StreamSegments) -> Vec<u32> {
    let start = Instant::now();
    let mut labels = vec![NO_LABEL; graph.len()];

    for &idx in acc.order.iter().rev() {
        let idx = idx as usize;
        let own = streams.segment_of[idx];
        labels[idx] = if own != NO_SEGMENT {
            own
        } else {
            match graph.downstream_ids()[idx] {
                NO_DOWNSTREAM => NO_LABEL,
                down => labels[down as usize],
            }
        };
    }

    info!(
        labeled = labels.iter().filter(|&&l| l != NO_LABEL).count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "basins labeled"
    );
    labels
}

/// Aggregates of one sub-catchment, gathered in a single raster pass
#[derive(Debug, Clone)]
pub struct CatchmentStats {
    pub segment_id: u32,
    pub cell_count: u64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub mean_elevation: f64,
    pub mean_slope_percent: f64,
    pub histogram: ElevationHistogram,
}

/// Per-label statistics for labels `0..count`.
///
/// Labels with no cells (cannot happen for labels produced by
/// [`label_basins`], since every segment labels its own cells) are an
/// inconsistency.
pub fn catchment_statistics(
    labels: &[u32],
    count: usize,
    surface: &Raster<f64>,
    slope: &Raster<f64>,
    bin_width: f64,
) -> Result<Vec<CatchmentStats>> {
    let empty = ElevationHistogram::new(bin_width)?;
    let mut cells = vec![0u64; count];
    let mut min = vec![f64::INFINITY; count];
    let mut max = vec![f64::NEG_INFINITY; count];
    let mut elev_sum = vec![0.0; count];
    let mut slope_sum = vec![0.0; count];
    let mut slope_cells = vec![0u64; count];
    let mut histograms = vec![empty; count];

    for (idx, &label) in labels.iter().enumerate() {
        if label == NO_LABEL {
            continue;
        }
        let l = label as usize;
        if l >= count {
            return Err(Error::Inconsistent(format!("label {label} out of range {count}")));
        }
        let z = surface.at(idx);
        cells[l] += 1;
        min[l] = min[l].min(z);
        max[l] = max[l].max(z);
        elev_sum[l] += z;
        histograms[l].add(z);
        let s = slope.at(idx);
        if s.is_finite() {
            slope_sum[l] += s;
            slope_cells[l] += 1;
        }
    }

    histograms
        .into_iter()
        .enumerate()
        .map(|(l, histogram)| {
            if cells[l] == 0 {
                return Err(Error::Inconsistent(format!("catchment {l} has no cells")));
            }
            Ok(CatchmentStats {
                segment_id: l as u32,
                cell_count: cells[l],
                min_elevation: min[l],
                max_elevation: max[l],
                mean_elevation: elev_sum[l] / cells[l] as f64,
                mean_slope_percent: if slope_cells[l] > 0 {
                    slope_sum[l] / slope_cells[l] as f64
                } else {
                    0.0
                },
                histogram,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_accumulation::flow_accumulation;
    use crate::stream_network::{classify_streams, StreamParams};
    use crate::vectorize::vectorize_streams;

    struct Fixture {
        graph: FlowGraph,
        acc: Accumulation,
        streams: StreamSegments,
        surface: Raster<f64>,
        slope: Raster<f64>,
    }

    fn fixture(codes: &[u8], rows: usize, cols: usize, threshold: u32) -> Fixture {
        let dirs = Raster::from_vec(codes.to_vec(), rows, cols).unwrap();
        let graph = FlowGraph::from_directions(&dirs, vec![true; rows * cols]).unwrap();
        let acc = flow_accumulation(&graph).unwrap();
        let net = classify_streams(&graph, &acc, &StreamParams { threshold_cells: threshold }).unwrap();
        let values = (0..rows * cols).map(|i| i as f64).collect();
        let surface = Raster::from_vec(values, rows, cols).unwrap();
        let slope = dirs.with_same_meta::<f64>(1.0);
        let streams = vectorize_streams(&graph, &acc, &net, &surface, &slope).unwrap();
        Fixture { graph, acc, streams, surface, slope }
    }

    // Branches along rows 0 and 2 meet at (1,2), then flow east
    #[rustfmt::skip]
    const FORK: [u8; 12] = [
        1, 8, 0, 0,
        0, 0, 1, 0,
        1, 2, 0, 0,
    ];

    #[test]
    fn test_labels_follow_drainage() {
        let f = fixture(&FORK, 3, 4, 2);
        let labels = label_basins(&f.graph, &f.acc, &f.streams);
        // (0,0) drains into the row-0 branch, (2,0) into the row-2 branch
        assert_eq!(labels[0], f.streams.segment_of[1]);
        assert_eq!(labels[8], f.streams.segment_of[9]);
        // Isolated outlets reach no stream
        assert_eq!(labels[2], NO_LABEL);
        assert_eq!(labels[4], NO_LABEL);
    }

    #[test]
    fn test_every_cell_on_a_stream_path_is_labeled() {
        let f = fixture(&FORK, 3, 4, 1);
        let labels = label_basins(&f.graph, &f.acc, &f.streams);
        assert!(labels.iter().all(|&l| l != NO_LABEL));
    }

    #[test]
    fn test_statistics_partition_cells() {
        let f = fixture(&FORK, 3, 4, 2);
        let labels = label_basins(&f.graph, &f.acc, &f.streams);
        let stats = catchment_statistics(&labels, f.streams.len(), &f.surface, &f.slope, 1.0).unwrap();
        let labeled = labels.iter().filter(|&&l| l != NO_LABEL).count() as u64;
        assert_eq!(stats.iter().map(|s| s.cell_count).sum::<u64>(), labeled);

        let row0 = &stats[f.streams.segment_of[1] as usize];
        assert_eq!(row0.cell_count, 2);
        assert_eq!(row0.min_elevation, 0.0);
        assert_eq!(row0.max_elevation, 1.0);
        assert_eq!(row0.mean_elevation, 0.5);
        assert_eq!(row0.histogram.total(), 2);
        assert_eq!(row0.mean_slope_percent, 1.0);
    }
}
