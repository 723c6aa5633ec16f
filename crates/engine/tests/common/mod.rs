#![allow(dead_code)]

use catchflow_core::{GeoTransform, InMemorySource};
use catchflow_hydro::{PreprocessParams, StreamParams};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 10x10 plane rising away from the north-west corner, 10 m cells.
/// Cell (row, col) has its center at (5 + 10 col, 95 - 10 row).
pub fn plane() -> InMemorySource {
    let values = (0..100).map(|i| ((i / 10) + (i % 10)) as f64).collect();
    InMemorySource::new(values, 10, 10, GeoTransform::new(0.0, 100.0, 10.0, -10.0))
}

pub fn params(threshold: u32) -> PreprocessParams {
    PreprocessParams {
        streams: StreamParams { threshold_cells: threshold },
        ..Default::default()
    }
}
