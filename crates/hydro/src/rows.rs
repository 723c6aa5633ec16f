//! Row-wise raster kernels
//!
//! Per-cell stages that only read shared input fill their output one row at
//! a time. With the `parallel` feature rows are spread over the rayon pool;
//! without it they run in order on the calling thread. Output is identical
//! either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One `cols`-wide buffer per row, pre-filled with `fill`, handed to `kernel`
/// with its row index; rows are concatenated in order.
pub(crate) fn map_rows<T, F>(rows: usize, cols: usize, fill: T, kernel: F) -> Vec<T>
where
    T: Clone + Send + Sync,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    let row_buffer = |row: usize| {
        let mut row_data = vec![fill.clone(); cols];
        kernel(row, &mut row_data);
        row_data
    };

    #[cfg(feature = "parallel")]
    return (0..rows).into_par_iter().flat_map(row_buffer).collect();

    #[cfg(not(feature = "parallel"))]
    (0..rows).flat_map(row_buffer).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_land_in_place() {
        let out = map_rows(3, 4, 0usize, |row, cells| {
            for (col, c) in cells.iter_mut().enumerate() {
                *c = row * 10 + col;
            }
        });
        assert_eq!(out, vec![0, 1, 2, 3, 10, 11, 12, 13, 20, 21, 22, 23]);
    }

    #[test]
    fn test_untouched_cells_keep_fill() {
        let out = map_rows(2, 2, u8::MAX, |row, cells| {
            if row == 1 {
                cells[0] = 0;
            }
        });
        assert_eq!(out, vec![u8::MAX, u8::MAX, 0, u8::MAX]);
    }
}
