//! Georeferenced raster output.
//!
//! Rasters are written as GeoTIFF in geographic WGS84
//! (EPSG:4326), north-up: the tie point is the northwest corner
//! `(lon_min, lat_max)` and rows advance southward.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use ndarray::{Array2, Array3};
use tiff::{
    encoder::{colortype, TiffEncoder, TiffValue},
    tags::Tag,
};
use tracing::debug;

use crate::{
    error::{Error, Result},
    geo::BoundingBox,
};

/// No-data sentinel of visual (3-band byte) rasters.
pub const RGB_NODATA: &str = "-99";

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// version 1.1.0, 3 keys: raster type PixelIsArea, model type
// geographic, geographic CRS WGS84
const GEO_KEYS_WGS84: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Run `write` against a hidden sibling of `path` and move the
/// result into place only once it succeeds. A failed write leaves
/// nothing behind at either path.
pub(crate) fn write_replacing<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::raster_write(path, "output path has no file name"))?;
    // keep the extension; some encoders pick the format from it
    let scratch = path.with_file_name(format!(".partial.{}", name));
    match write(&scratch) {
        Ok(()) => fs::rename(&scratch, path).map_err(|e| Error::raster_write(path, e)),
        Err(e) => {
            let _ = fs::remove_file(&scratch);
            Err(e)
        }
    }
}

/// Affine pixel-to-geographic transform, in the usual
/// `(x0, dx, rx, y0, ry, dy)` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub lon_origin: f64,
    pub x_res: f64,
    pub lat_origin: f64,
    pub y_res: f64,
}

impl GeoTransform {
    pub fn from_bounds(bbox: &BoundingBox, nrows: usize, ncols: usize) -> Self {
        GeoTransform {
            lon_origin: bbox.lon_min,
            x_res: (bbox.lon_max - bbox.lon_min) / ncols as f64,
            lat_origin: bbox.lat_max,
            y_res: (bbox.lat_max - bbox.lat_min) / nrows as f64,
        }
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [self.lon_origin, self.x_res, 0., self.lat_origin, 0., -self.y_res]
    }

    /// Geographic position `(lat, lon)` of the top-left corner of a pixel.
    pub fn pixel_corner(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.lat_origin - row as f64 * self.y_res,
            self.lon_origin + col as f64 * self.x_res,
        )
    }
}

/// Destination for georeferenced rasters.
pub trait RasterSink {
    /// Single-band float raster of physical values.
    fn write_float(&self, grid: &Array2<f64>, bbox: &BoundingBox, path: &Path) -> Result<()>;

    /// Three-band byte raster, `(rows, cols, 3)`.
    fn write_rgb(&self, rgb: &Array3<u8>, bbox: &BoundingBox, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    fn encode<C>(
        path: &Path,
        (ht, wid): (usize, usize),
        bbox: &BoundingBox,
        data: &[C::Inner],
        nodata: Option<&str>,
    ) -> Result<()>
    where
        C: colortype::ColorType,
        [C::Inner]: TiffValue,
    {
        let transform = GeoTransform::from_bounds(bbox, ht, wid);
        debug!(?transform, "writing {}", path.display());

        write_replacing(path, |scratch| {
            Self::encode_to::<C>(scratch, (ht, wid), &transform, data, nodata)
                .map_err(|e| Error::raster_write(path, e))
        })
    }

    fn encode_to<C>(
        path: &Path,
        (ht, wid): (usize, usize),
        transform: &GeoTransform,
        data: &[C::Inner],
        nodata: Option<&str>,
    ) -> tiff::TiffResult<()>
    where
        C: colortype::ColorType,
        [C::Inner]: TiffValue,
    {
        let file = BufWriter::new(File::create(path)?);
        let mut tiff = TiffEncoder::new(file)?;
        let mut image = tiff.new_image::<C>(wid as u32, ht as u32)?;
        {
            let dir = image.encoder();
            dir.write_tag(tag(MODEL_PIXEL_SCALE), &[transform.x_res, transform.y_res, 0.][..])?;
            dir.write_tag(
                tag(MODEL_TIEPOINT),
                &[0., 0., 0., transform.lon_origin, transform.lat_origin, 0.][..],
            )?;
            dir.write_tag(tag(GEO_KEY_DIRECTORY), &GEO_KEYS_WGS84[..])?;
            if let Some(nodata) = nodata {
                dir.write_tag(tag(GDAL_NODATA), nodata)?;
            }
        }
        image.write_data(data)
    }
}

impl RasterSink for GeoTiffWriter {
    fn write_float(&self, grid: &Array2<f64>, bbox: &BoundingBox, path: &Path) -> Result<()> {
        let data: Vec<f32> = grid.iter().map(|&v| v as f32).collect();
        Self::encode::<colortype::Gray32Float>(path, grid.dim(), bbox, &data, None)
    }

    fn write_rgb(&self, rgb: &Array3<u8>, bbox: &BoundingBox, path: &Path) -> Result<()> {
        let (ht, wid, bands) = rgb.dim();
        if bands != 3 {
            return Err(Error::raster_write(path, format!("expected 3 bands, found {}", bands)));
        }
        let data: Vec<u8> = rgb.iter().copied().collect();
        Self::encode::<colortype::RGB8>(path, (ht, wid), bbox, &data, Some(RGB_NODATA))
    }
}
