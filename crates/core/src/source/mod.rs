//! RasterIngest: the boundary where elevation data enters the engine.
//!
//! A [`RasterSource`] supplies the grid, its nodata value, cell size and CRS.
//! The engine never fetches data itself; whatever the source hands over is
//! validated once into an [`ElevationGrid`] and is immutable from then on.

mod geotiff;

pub use geotiff::{write_geotiff, GeoTiffSource};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// Upstream collaborator that owns raster acquisition.
pub trait RasterSource: Send + Sync {
    /// Short human-readable description for logs
    fn describe(&self) -> String;

    /// Read and validate the elevation grid
    fn read_elevation(&self) -> Result<ElevationGrid>;
}

/// A validated elevation raster.
///
/// Invariants checked on construction: non-empty, finite north-up transform
/// with square cells, finite nodata value, at least one valid cell.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    raster: Raster<f64>,
    valid_cells: usize,
}

impl ElevationGrid {
    pub fn new(raster: Raster<f64>) -> Result<Self> {
        let (rows, cols) = raster.shape();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let gt = raster.transform();
        if !gt.is_valid() {
            return Err(Error::InvalidParameter {
                name: "transform",
                value: format!("{:?}", gt),
                reason: "coefficients must be finite and non-zero".into(),
            });
        }
        let (w, h) = (gt.pixel_width.abs(), gt.pixel_height.abs());
        if ((w - h) / w).abs() > 1e-9 {
            return Err(Error::InvalidParameter {
                name: "cell_size",
                value: format!("{}x{}", w, h),
                reason: "cells must be square".into(),
            });
        }

        if let Some(nd) = raster.nodata() {
            if !nd.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "nodata",
                    value: nd.to_string(),
                    reason: "declared nodata must be finite (NaN is always nodata)".into(),
                });
            }
        }

        if let Some(&bad) = raster.data().iter().find(|&&v| !raster.is_nodata(v) && !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "elevation",
                value: bad.to_string(),
                reason: "elevations must be finite".into(),
            });
        }

        let valid_cells = raster.data().iter().filter(|&&v| !raster.is_nodata(v)).count();
        if valid_cells == 0 {
            return Err(Error::InvalidParameter {
                name: "elevation",
                value: format!("{}x{}", cols, rows),
                reason: "raster holds no valid cells".into(),
            });
        }

        Ok(Self { raster, valid_cells })
    }

    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    pub fn into_raster(self) -> Raster<f64> {
        self.raster
    }

    pub fn valid_cells(&self) -> usize {
        self.valid_cells
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.raster.crs()
    }
}

/// Elevation values already held in memory (tests, synthetic grids,
/// callers that decoded the raster themselves).
#[derive(Debug, Clone)]
pub struct InMemorySource {
    values: Vec<f64>,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    nodata: Option<f64>,
    crs: Option<CRS>,
}

impl InMemorySource {
    pub fn new(values: Vec<f64>, rows: usize, cols: usize, transform: GeoTransform) -> Self {
        Self {
            values,
            rows,
            cols,
            transform,
            nodata: None,
            crs: None,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_crs(mut self, crs: CRS) -> Self {
        self.crs = Some(crs);
        self
    }
}

impl RasterSource for InMemorySource {
    fn describe(&self) -> String {
        format!("in-memory {}x{} grid", self.cols, self.rows)
    }

    fn read_elevation(&self) -> Result<ElevationGrid> {
        let mut raster = Raster::from_vec(self.values.clone(), self.rows, self.cols)?;
        raster.set_transform(self.transform);
        raster.set_nodata(self.nodata);
        raster.set_crs(self.crs.clone());
        ElevationGrid::new(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(values: Vec<f64>) -> InMemorySource {
        InMemorySource::new(values, 2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0))
    }

    #[test]
    fn test_valid_grid() {
        let grid = source(vec![1.0, 2.0, -9999.0, 4.0])
            .with_nodata(-9999.0)
            .with_crs(CRS::from_epsg(32633))
            .read_elevation()
            .unwrap();
        assert_eq!(grid.valid_cells(), 3);
        assert_eq!(grid.crs().and_then(|c| c.epsg()), Some(32633));
    }

    #[test]
    fn test_rejects_all_nodata() {
        let err = source(vec![f64::NAN; 4]).read_elevation().unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_rejects_infinite_elevation() {
        for inf in [f64::INFINITY, f64::NEG_INFINITY] {
            let err = source(vec![1.0, inf, 3.0, 4.0]).read_elevation().unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { name: "elevation", .. }));
            assert!(err.is_input_error());
        }
        // NaN stays nodata
        assert_eq!(source(vec![1.0, f64::NAN, 3.0, 4.0]).read_elevation().unwrap().valid_cells(), 3);
    }

    #[test]
    fn test_rejects_non_square_cells() {
        let src = InMemorySource::new(vec![1.0; 4], 2, 2, GeoTransform::new(0.0, 0.0, 10.0, -5.0));
        assert!(matches!(
            src.read_elevation(),
            Err(Error::InvalidParameter { name: "cell_size", .. })
        ));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let src = InMemorySource::new(vec![1.0; 3], 2, 2, GeoTransform::default());
        assert!(matches!(src.read_elevation(), Err(Error::InvalidDimensions { .. })));
    }
}
