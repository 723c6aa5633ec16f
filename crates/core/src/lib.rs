//! # catchflow core
//!
//! Grid types and ingestion for the catchflow drainage engine.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced 2D grid with a nodata value
//! - `GeoTransform`: affine pixel/world mapping
//! - `CRS`: coordinate reference system tag carried through to outputs
//! - `d8`: the eight-direction flow encoding shared by every stage
//! - `RasterSource`: the collaborator that hands elevation grids to the engine

pub mod crs;
pub mod error;
pub mod raster;
pub mod source;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{d8, GeoTransform, Raster, RasterElement};
pub use source::{ElevationGrid, InMemorySource, RasterSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{d8, GeoTransform, Raster, RasterElement};
    pub use crate::source::{ElevationGrid, RasterSource};
    pub use crate::Algorithm;
}

/// Common shape for the preprocessing stages.
///
/// Each stage is a pure transformation from one intermediate product to the
/// next; the structs implementing this trait carry no state of their own.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
