//! Error taxonomy shared by every stage of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("required input not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("calibration failed: {0}")]
    Calibration(String),

    #[error("failed to write raster {}: {reason}", path.display())]
    RasterWrite { path: PathBuf, reason: String },

    #[error("failed to write table: {0}")]
    Table(#[from] csv::Error),

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Missing key in the metadata record.
    pub fn missing_key(key: &str) -> Self {
        Error::Metadata(format!("missing key `{}`", key))
    }

    pub fn raster_write<P: Into<PathBuf>, E: ToString>(path: P, err: E) -> Self {
        Error::RasterWrite {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Whether the error prevents producing any output for the
    /// dataset (as opposed to failing a single artifact).
    pub fn aborts_dataset(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Decode(_) | Error::Metadata(_) | Error::Calibration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
