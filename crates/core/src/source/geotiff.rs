//! Native single-band GeoTIFF source.
//!
//! Reads the elevation band with the `tiff` crate and derives the transform
//! from ModelPixelScale + ModelTiepoint. Nodata and CRS are not decoded from
//! GeoKeys; the caller states them, as the source contract requires.

use super::{ElevationGrid, RasterSource};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

/// GeoTIFF file on local disk
#[derive(Debug, Clone)]
pub struct GeoTiffSource {
    path: PathBuf,
    nodata: Option<f64>,
    crs: Option<CRS>,
}

impl GeoTiffSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
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

impl RasterSource for GeoTiffSource {
    fn describe(&self) -> String {
        format!("GeoTIFF {}", self.path.display())
    }

    fn read_elevation(&self) -> Result<ElevationGrid> {
        let file = BufReader::new(File::open(&self.path)?);
        let mut raster = decode(file)?;
        debug!(path = %self.path.display(), rows = raster.rows(), cols = raster.cols(), "decoded GeoTIFF");
        raster.set_nodata(self.nodata);
        raster.set_crs(self.crs.clone());
        ElevationGrid::new(raster)
    }
}

fn cast_all<V: Copy + Into<f64>>(buf: Vec<V>) -> Vec<f64> {
    buf.into_iter().map(Into::into).collect()
}

fn decode<R: Read + Seek>(reader: R) -> Result<Raster<f64>> {
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let image = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<f64> = match image {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => buf,
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "elevation band must be 8/16/32-bit integer or 32/64-bit float".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::UnsupportedDataType(format!(
            "expected a single band of {} samples, got {}",
            rows * cols,
            data.len()
        )));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(read_geotransform(&mut decoder)?);
    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::UnsupportedDataType("missing ModelPixelScale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::UnsupportedDataType("missing ModelTiepoint tag".into()))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::UnsupportedDataType("malformed georeferencing tags".into()));
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    Ok(GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        -scale[1],
    ))
}

/// Write an f64 raster as a single-band GeoTIFF.
///
/// Used to export conditioned surfaces for inspection in desktop GIS.
pub fn write_geotiff(raster: &Raster<f64>, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode(raster, file)
}

fn encode<W: Write + Seek>(raster: &Raster<f64>, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;
    let (rows, cols) = raster.shape();
    let data = raster.to_flat_vec();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    // Version 1.1.0, 2 keys: projected model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];

    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
    Ok(())
}
