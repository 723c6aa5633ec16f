//! Internal nodata hole conditioning
//!
//! Voids inside the DEM footprint (sensor dropouts, removed artefacts) would
//! otherwise act as sinks and split basins. Nodata regions that touch the
//! raster border are the footprint's exterior and are left alone.
//!
//! Each iteration assigns every hole cell that has at least one valid 3x3
//! neighbor the mean of those neighbors, reading from the previous
//! iteration's state. Cells still void after `max_iterations` stay nodata.

use catchflow_core::d8;
use catchflow_core::raster::Raster;
use std::collections::VecDeque;

/// Outcome of hole conditioning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleFillReport {
    /// Internal hole cells that received an elevation
    pub filled: usize,
    /// Internal hole cells left as nodata
    pub unresolved: usize,
}

/// Pre-fill internal nodata holes by iterative 3x3 averaging.
///
/// Returns a copy of `dem` in which filled cells carry their averaged value
/// and every remaining nodata cell is NaN.
pub fn fill_nodata_holes(dem: &Raster<f64>, max_iterations: usize) -> (Raster<f64>, HoleFillReport) {
    let (rows, cols) = dem.shape();
    let n = rows * cols;

    let mut values: Vec<f64> = dem
        .data()
        .iter()
        .map(|&v| if dem.is_nodata(v) { f64::NAN } else { v })
        .collect();

    // Nodata reachable from the border through nodata is exterior.
    let mut exterior = vec![false; n];
    let mut queue = VecDeque::new();
    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            let on_border = row == 0 || col == 0 || row == rows - 1 || col == cols - 1;
            if on_border && values[idx].is_nan() {
                exterior[idx] = true;
                queue.push_back((row, col));
            }
        }
    }
    while let Some((row, col)) = queue.pop_front() {
        for (_, nr, nc) in d8::neighbors(row, col, rows, cols) {
            let nidx = nr * cols + nc;
            if values[nidx].is_nan() && !exterior[nidx] {
                exterior[nidx] = true;
                queue.push_back((nr, nc));
            }
        }
    }

    let mut holes: Vec<usize> = (0..n)
        .filter(|&i| values[i].is_nan() && !exterior[i])
        .collect();
    let total_holes = holes.len();

    for _ in 0..max_iterations {
        if holes.is_empty() {
            break;
        }
        let updates: Vec<(usize, f64)> = holes
            .iter()
            .filter_map(|&idx| {
                let (row, col) = (idx / cols, idx % cols);
                let (sum, count) = d8::neighbors(row, col, rows, cols)
                    .map(|(_, nr, nc)| values[nr * cols + nc])
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                (count > 0).then(|| (idx, sum / count as f64))
            })
            .collect();

        if updates.is_empty() {
            break;
        }
        for &(idx, v) in &updates {
            values[idx] = v;
        }
        holes.retain(|&idx| values[idx].is_nan());
    }

    let report = HoleFillReport {
        filled: total_holes - holes.len(),
        unresolved: holes.len(),
    };

    let mut output = dem.with_same_meta::<f64>(f64::NAN);
    output.set_nodata(dem.nodata());
    for (cell, v) in output.data_mut().iter_mut().zip(values) {
        *cell = v;
    }
    (output, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn test_single_hole_gets_neighbor_mean() {
        let nd = -9999.0;
        #[rustfmt::skip]
        let values = vec![
            1.0, 2.0, 3.0,
            4.0, nd, 6.0,
            7.0, 8.0, 9.0,
        ];
        let dem = grid(values, 3, 3);
        let (out, report) = fill_nodata_holes(&dem, 5);
        assert_eq!(report, HoleFillReport { filled: 1, unresolved: 0 });
        assert!((out.get(1, 1).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_border_nodata_is_not_filled() {
        let nd = -9999.0;
        #[rustfmt::skip]
        let values = vec![
            nd, nd, 3.0,
            nd, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];
        let dem = grid(values, 3, 3);
        let (out, report) = fill_nodata_holes(&dem, 5);
        assert_eq!(report.filled, 0);
        assert!(out.get(0, 0).unwrap().is_nan());
        assert!(out.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_iteration_budget_leaves_core_unresolved() {
        // 3x3 hole in a 7x7 grid: the center needs two iterations.
        let nd = -9999.0;
        let mut values = vec![10.0; 49];
        for row in 2..5 {
            for col in 2..5 {
                values[row * 7 + col] = nd;
            }
        }
        let dem = grid(values, 7, 7);

        let (_, one) = fill_nodata_holes(&dem, 1);
        assert_eq!(one, HoleFillReport { filled: 8, unresolved: 1 });

        let (out, two) = fill_nodata_holes(&dem, 2);
        assert_eq!(two, HoleFillReport { filled: 9, unresolved: 0 });
        assert!((out.get(3, 3).unwrap() - 10.0).abs() < 1e-12);
    }
}
