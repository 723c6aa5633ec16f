//! Slope percent by Horn's method
//!
//! Computed on the filled surface. Neighbors outside the grid or without
//! data take the center value, so border cells and cells beside holes still
//! get a (one-sided) slope instead of dropping out.

use crate::rows::map_rows;
use catchflow_core::raster::Raster;

/// Per-cell slope in percent (rise over run × 100); NaN where there is no data.
pub fn slope_percent(surface: &Raster<f64>) -> Raster<f64> {
    let (rows, cols) = surface.shape();
    let eight_cell_size = 8.0 * surface.cell_size();

    let output_data = map_rows(rows, cols, f64::NAN, |row, row_data| {
        for col in 0..cols {
            let e = unsafe { surface.get_unchecked(row, col) };
            if surface.is_nodata(e) {
                continue;
            }

            let z = |dr: isize, dc: isize| -> f64 {
                let r = row as isize + dr;
                let c = col as isize + dc;
                if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                    return e;
                }
                let v = unsafe { surface.get_unchecked(r as usize, c as usize) };
                if surface.is_nodata(v) {
                    e
                } else {
                    v
                }
            };

            let (a, b, c) = (z(-1, -1), z(-1, 0), z(-1, 1));
            let (d, f) = (z(0, -1), z(0, 1));
            let (g, h, i) = (z(1, -1), z(1, 0), z(1, 1));

            let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / eight_cell_size;
            let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / eight_cell_size;

            row_data[col] = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt() * 100.0;
        }
    });

    let mut output = surface.with_same_meta::<f64>(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    output
        .data_mut()
        .iter_mut()
        .zip(output_data)
        .for_each(|(dst, v)| *dst = v);
    output
}
