//! Priority-Flood depression filling with D8 direction assignment
//!
//! Border cells (and, by default, cells touching nodata) seed a min-heap.
//! Popping the lowest cell raises every unvisited neighbor to at least the
//! popped elevation plus `epsilon` and records the popped cell as that
//! neighbor's flood parent.
//!
//! Directions are then taken from the filled surface: the steepest strictly
//! lower neighbor when one exists, otherwise the flood parent (flats and
//! filled depressions), otherwise none (an outlet). Every step either drops
//! strictly or follows the flood tree, so the result is acyclic.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). Priority-Flood: An optimal
//! depression-filling and watershed-labeling algorithm for digital elevation
//! models. *Computers & Geosciences*, 62, 117–127.

use crate::conditioning::fill_nodata_holes;
use crate::rows::map_rows;
use crate::residual::repair_residuals;
use catchflow_core::raster::{d8, Raster};
use catchflow_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::{info, warn};

/// A cell in the priority queue, ordered by elevation then insertion order.
#[derive(Debug, Clone, Copy)]
struct Cell {
    elevation: f64,
    seq: u64,
    idx: usize,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so BinaryHeap (max-heap) pops the lowest cell; FIFO among equals
impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .elevation
            .total_cmp(&self.elevation)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Parameters for depression filling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillParams {
    /// Minimum rise enforced from a popped cell to the neighbors it floods.
    /// Zero leaves filled depressions perfectly flat.
    pub epsilon: f64,
    /// Iteration budget for averaging internal nodata holes
    pub max_hole_fill_iterations: usize,
    /// Whether cells adjacent to nodata drain out of the grid like border cells
    pub drain_to_nodata: bool,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            max_hole_fill_iterations: 10,
            drain_to_nodata: true,
        }
    }
}

/// Counters describing what filling did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    pub holes_filled: usize,
    pub holes_unresolved: usize,
    /// Cells whose filled elevation exceeds the input
    pub cells_raised: usize,
    /// Cells routed by the best-effort residual repair
    pub repaired: usize,
    /// Valid cells without a downstream neighbor
    pub outlets: usize,
}

/// Filled surface and D8 directions
#[derive(Debug, Clone)]
pub struct FlowRouting {
    /// Filled elevation; NaN where the cell holds no data
    pub filled: Raster<f64>,
    /// D8 code per cell, `d8::NONE` for outlets and nodata
    pub direction: Raster<u8>,
    pub report: FillReport,
}

impl FlowRouting {
    /// Whether the cell at flat index `idx` takes part in routing
    pub fn is_valid(&self, idx: usize) -> bool {
        !self.filled.at(idx).is_nan()
    }
}

/// Priority-Flood filling plus D8 routing
#[derive(Debug, Clone, Default)]
pub struct DepressionFiller;

impl Algorithm for DepressionFiller {
    type Input = Raster<f64>;
    type Output = FlowRouting;
    type Params = FillParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Priority-Flood + D8"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_depressions(&input, &params)
    }
}

/// Fill depressions and assign a D8 direction to every valid cell.
///
/// # Algorithm
/// 1. Pre-fill internal nodata holes (bounded iterations)
/// 2. Seed the heap with border cells and, if `drain_to_nodata`, cells next
///    to nodata
/// 3. Pop the lowest cell; each unvisited neighbor gets
///    `max(own, popped + epsilon)`, remembers the popped cell, and is pushed
/// 4. Route each cell down its steepest strictly lower neighbor, falling
///    back to the flood parent
/// 5. Cells never reached by the flood are handed to the residual repair
pub fn fill_depressions(dem: &Raster<f64>, params: &FillParams) -> Result<FlowRouting> {
    if !params.epsilon.is_finite() || params.epsilon < 0.0 {
        return Err(Error::InvalidParameter {
            name: "epsilon",
            value: params.epsilon.to_string(),
            reason: "must be finite and non-negative".into(),
        });
    }

    let start = Instant::now();
    let (conditioned, holes) = fill_nodata_holes(dem, params.max_hole_fill_iterations);
    let (rows, cols) = conditioned.shape();
    let n = rows * cols;

    let original = conditioned.to_flat_vec();
    let valid: Vec<bool> = original.iter().map(|v| !v.is_nan()).collect();
    let mut filled = original.clone();
    let mut visited = vec![false; n];
    let mut parent = vec![d8::NONE; n];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            if !valid[idx] {
                continue;
            }
            let on_border = row == 0 || col == 0 || row == rows - 1 || col == cols - 1;
            let touches_nodata = params.drain_to_nodata
                && d8::neighbors(row, col, rows, cols).any(|(_, r, c)| !valid[r * cols + c]);
            if on_border || touches_nodata {
                visited[idx] = true;
                heap.push(Cell { elevation: filled[idx], seq, idx });
                seq += 1;
            }
        }
    }

    while let Some(cell) = heap.pop() {
        let (row, col) = (cell.idx / cols, cell.idx % cols);
        for (_, nr, nc) in d8::neighbors(row, col, rows, cols) {
            let nidx = nr * cols + nc;
            if visited[nidx] || !valid[nidx] {
                continue;
            }
            visited[nidx] = true;

            // Raise to the spill level when the neighbor sits in a depression
            let level = cell.elevation + params.epsilon;
            if filled[nidx] < level {
                filled[nidx] = level;
            }
            parent[nidx] = d8::code_between((nr, nc), (row, col)).unwrap_or(d8::NONE);
            heap.push(Cell { elevation: filled[nidx], seq, idx: nidx });
            seq += 1;
        }
    }

    let mut direction = steepest_descent(&filled, &valid, rows, cols);
    for idx in 0..n {
        if valid[idx] && direction[idx] == d8::NONE {
            direction[idx] = parent[idx];
        }
    }

    let residual: Vec<usize> = (0..n).filter(|&i| valid[i] && !visited[i]).collect();
    let repaired = if residual.is_empty() {
        0
    } else {
        let count = repair_residuals(&residual, &mut filled, &mut direction, &valid, rows, cols);
        warn!(
            cells = residual.len(),
            repaired = count,
            "unreached cells routed by best-effort plateau repair"
        );
        count
    };

    let cells_raised = (0..n).filter(|&i| valid[i] && filled[i] > original[i]).count();
    let outlets = (0..n).filter(|&i| valid[i] && direction[i] == d8::NONE).count();
    let report = FillReport {
        holes_filled: holes.filled,
        holes_unresolved: holes.unresolved,
        cells_raised,
        repaired,
        outlets,
    };

    let mut filled_raster = conditioned.with_same_meta::<f64>(f64::NAN);
    filled_raster.set_nodata(dem.nodata());
    filled_raster
        .data_mut()
        .iter_mut()
        .zip(filled)
        .for_each(|(dst, v)| *dst = v);

    let mut direction_raster = conditioned.with_same_meta::<u8>(d8::NONE);
    direction_raster
        .data_mut()
        .iter_mut()
        .zip(direction)
        .for_each(|(dst, v)| *dst = v);

    info!(
        rows,
        cols,
        raised = report.cells_raised,
        outlets = report.outlets,
        holes_filled = report.holes_filled,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "depressions filled"
    );

    Ok(FlowRouting {
        filled: filled_raster,
        direction: direction_raster,
        report,
    })
}

/// Steepest strictly lower valid neighbor per cell; ties keep the lowest code.
fn steepest_descent(filled: &[f64], valid: &[bool], rows: usize, cols: usize) -> Vec<u8> {
    map_rows(rows, cols, d8::NONE, |row, row_data| {
        for col in 0..cols {
            let idx = row * cols + col;
            if !valid[idx] {
                continue;
            }
            let center = filled[idx];
            let mut best_drop = 0.0;
            for (dir, nr, nc) in d8::neighbors(row, col, rows, cols) {
                let nidx = nr * cols + nc;
                if !valid[nidx] {
                    continue;
                }
                let drop = (center - filled[nidx]) / d8::DISTANCES[(dir - 1) as usize];
                if drop > best_drop {
                    best_drop = drop;
                    row_data[col] = dir;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchflow_core::GeoTransform;

    fn raster(values: &[f64], rows: usize, cols: usize) -> Raster<f64> {
        let mut dem = Raster::from_vec(values.to_vec(), rows, cols).unwrap();
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        dem.set_nodata(Some(-9999.0));
        dem
    }

    fn dem_with_sink() -> Raster<f64> {
        // 7x7 DEM with a depression in the center
        #[rustfmt::skip]
        let values = [
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 3.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
        ];
        raster(&values, 7, 7)
    }

    fn follow_to_outlet(routing: &FlowRouting, mut row: usize, mut col: usize) -> usize {
        let (rows, cols) = routing.direction.shape();
        let mut steps = 0;
        loop {
            let dir = routing.direction.get(row, col).unwrap();
            match d8::step(row, col, dir, rows, cols) {
                Some((r, c)) => {
                    let here = routing.filled.get(row, col).unwrap();
                    let next = routing.filled.get(r, c).unwrap();
                    assert!(next <= here, "uphill step ({row},{col}) -> ({r},{c})");
                    row = r;
                    col = c;
                    steps += 1;
                    assert!(steps <= rows * cols, "cycle through ({row},{col})");
                }
                None => return steps,
            }
        }
    }

    #[test]
    fn test_sink_is_raised_to_spill_level() {
        let routing = fill_depressions(
            &dem_with_sink(),
            &FillParams { epsilon: 0.0, ..Default::default() },
        )
        .unwrap();
        assert!(routing.filled.get(3, 3).unwrap() >= 7.0);
        // The border ring is the lowest spill, so the whole interior rises to 9
        assert_eq!(routing.report.cells_raised, 25);
        assert_eq!(routing.filled.get(1, 1).unwrap(), 9.0);
    }

    #[test]
    fn test_never_lowers_elevation() {
        let dem = dem_with_sink();
        let routing = fill_depressions(&dem, &FillParams::default()).unwrap();
        for (orig, fill) in dem.data().iter().zip(routing.filled.data().iter()) {
            assert!(fill >= orig);
        }
    }

    #[test]
    fn test_every_cell_reaches_an_outlet() {
        let routing = fill_depressions(&dem_with_sink(), &FillParams::default()).unwrap();
        for row in 0..7 {
            for col in 0..7 {
                follow_to_outlet(&routing, row, col);
            }
        }
        assert_eq!(routing.report.repaired, 0);
    }

    #[test]
    fn test_flat_fill_routes_through_flood_tree() {
        // epsilon = 0 leaves a flat lake; cells must still leave it
        let routing = fill_depressions(
            &dem_with_sink(),
            &FillParams { epsilon: 0.0, ..Default::default() },
        )
        .unwrap();
        assert_ne!(routing.direction.get(3, 3).unwrap(), d8::NONE);
        follow_to_outlet(&routing, 3, 3);
    }

    #[test]
    fn test_plane_drains_to_lowest_corner() {
        let values: Vec<f64> = (0..100).map(|i| ((i / 10) + (i % 10)) as f64).collect();
        let routing = fill_depressions(&raster(&values, 10, 10), &FillParams::default()).unwrap();

        assert_eq!(routing.report.outlets, 1);
        assert_eq!(routing.direction.get(0, 0).unwrap(), d8::NONE);
        assert_eq!(routing.direction.get(5, 5).unwrap(), 4); // NW
        assert_eq!(routing.direction.get(0, 5).unwrap(), 5); // W
        assert_eq!(routing.report.cells_raised, 0);
    }

    #[test]
    fn test_low_border_outlet_sets_fill_level() {
        let mut values = vec![10.0; 25];
        for row in 1..4 {
            for col in 1..4 {
                values[row * 5 + col] = 5.0;
            }
        }
        values[2 * 5 + 2] = 1.0; // sink
        values[4 * 5 + 2] = 2.0; // low border outlet
        let routing = fill_depressions(
            &raster(&values, 5, 5),
            &FillParams { epsilon: 0.0, ..Default::default() },
        )
        .unwrap();
        let center = routing.filled.get(2, 2).unwrap();
        assert!((2.0..=5.0).contains(&center), "center filled to {center}");
        follow_to_outlet(&routing, 2, 2);
    }

    #[test]
    fn test_enclosed_island_is_repaired() {
        let nd = -9999.0;
        // Island of data inside a ring of nodata that touches the border
        #[rustfmt::skip]
        let values = [
            nd,  nd,  nd,  nd,  nd,
            nd,  5.0, 4.0, 6.0, nd,
            nd,  3.0, 2.0, 7.0, nd,
            nd,  nd,  nd,  nd,  nd,
        ];
        let routing = fill_depressions(
            &raster(&values, 4, 5),
            &FillParams { drain_to_nodata: false, ..Default::default() },
        )
        .unwrap();

        assert_eq!(routing.report.outlets, 1);
        assert_eq!(routing.direction.get(2, 2).unwrap(), d8::NONE);
        assert!(routing.report.repaired > 0);
        for (row, col) in [(1, 1), (1, 2), (1, 3), (2, 1), (2, 3)] {
            follow_to_outlet(&routing, row, col);
        }
    }

    #[test]
    fn test_drain_to_nodata_makes_edge_outlets() {
        let nd = -9999.0;
        #[rustfmt::skip]
        let values = [
            nd,  nd,  nd,  nd,
            nd,  5.0, 4.0, nd,
            nd,  3.0, 6.0, nd,
            nd,  nd,  nd,  nd,
        ];
        let routing = fill_depressions(&raster(&values, 4, 4), &FillParams::default()).unwrap();
        assert_eq!(routing.report.repaired, 0);
        assert_eq!(routing.direction.get(2, 1).unwrap(), d8::NONE);
        assert_eq!(routing.report.outlets, 1);
    }

    #[test]
    fn test_negative_epsilon_rejected() {
        let err = fill_depressions(
            &dem_with_sink(),
            &FillParams { epsilon: -1.0, ..Default::default() },
        )
        .unwrap_err();
        assert!(err.is_input_error());
    }
}
