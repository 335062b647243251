//! Convert raw field-scanner sensor captures into georeferenced
//! rasters.
//!
//! The gantry at the field site carries a thermal camera, a PSII
//! fluorescence imager and NDVI/PRI spectral sensors. Each capture
//! lands as a dataset of raw binary dumps plus a JSON measurement
//! record holding the gantry position, the camera offsets and
//! field of view, and the sensor calibration constants. This crate
//! provides:
//!
//! 1. [Decoding](decode) of the fixed-layout binary captures into
//! sample grids.
//!
//! 2. Conversion of raw counts to physical values: [temperature]
//! through the radiometric model of the thermal camera, and
//! [Fv/Fm](fluorescence) from a fluorescence frame sequence.
//!
//! 3. [Geolocation](geo) of a capture from its measurement
//! record, and [GeoTIFF output](raster) in WGS84.
//!
//! 4. A [pipeline] that runs the above per dataset, skipping
//! datasets that were already processed, and reports to the data
//! [platform].
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn test_compile() -> gantry_raster::Result<()> {
//! use gantry_raster::{
//!     features::OctaveFeatureExtractor, platform::LocalPlatform, raster::GeoTiffWriter,
//!     Pipeline, PipelineConfig,
//! };
//!
//! let config = PipelineConfig::builder().output_root("/data/Level_1").build()?;
//! let platform = LocalPlatform::new(&config.output_root);
//! let pipeline = Pipeline::new(config, GeoTiffWriter, OctaveFeatureExtractor::default());
//! pipeline.run(&platform, "/data/raw/flirIrCamera - 2017-04-27__10-00-00")?;
//! # Ok(())
//! # }
//! ```
//!
//! Individual stages can be used on their own:
//!
//! ```rust,no_run
//! # fn test_compile() -> gantry_raster::Result<()> {
//! use std::path::Path;
//! use gantry_raster::{
//!     decode::decode, sensor::FrameLayout,
//!     temperature::{calibrate, AmbientConditions, CalibrationParameters},
//! };
//!
//! let frame = decode(Path::new("capture_ir.bin"), &FrameLayout::THERMAL)?.rotated(3);
//! let temps = calibrate(
//!     &frame,
//!     &CalibrationParameters::uncalibrated(),
//!     &AmbientConditions::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod parse;

pub mod error;
pub mod logger;

pub mod config;
pub mod sensor;
pub mod decode;
pub mod metadata;

pub mod temperature;
pub mod fluorescence;
pub mod features;

pub mod utm;
pub mod geo;

pub mod preview;
pub mod raster;
pub mod trait_table;

pub mod platform;
pub mod pipeline;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::config::PipelineConfig;
pub use crate::error::{Error, Result};
pub use crate::pipeline::{CheckDecision, Dataset, Pipeline, RunOutcome};
pub use crate::sensor::SensorKind;
