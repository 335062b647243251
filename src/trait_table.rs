//! CSV trait tables.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::*;

use crate::{error::Result, sensor::SensorKind};

/// One mean surface temperature measurement, in the field layout
/// expected by the trait database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeanTemperatureRecord {
    pub local_datetime: String,
    pub surface_temperature: f64,
    pub access_level: String,
    pub species: String,
    pub site: String,
    pub citation_author: String,
    pub citation_year: String,
    pub citation_title: String,
    pub method: String,
}

impl MeanTemperatureRecord {
    pub fn new(scan_time: &str, mean_c: f64, site: &str) -> Self {
        MeanTemperatureRecord {
            local_datetime: iso_datetime(scan_time),
            surface_temperature: mean_c,
            access_level: "2".into(),
            species: "Sorghum bicolor".into(),
            site: site.into(),
            citation_author: "Zongyang, Li".into(),
            citation_year: "2016".into(),
            citation_title: "Maricopa Field Station Data and Metadata".into(),
            method: "Mean temperature from infrared images".into(),
        }
    }
}

/// `MM/DD/YYYY HH:MM:SS` to `YYYY-MM-DDTHH:MM:SS`. Other formats
/// pass through unchanged.
pub fn iso_datetime(scan_time: &str) -> String {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^(\d{2})/(\d{2})/(\d{4})[ T](\d{2}:\d{2}:\d{2})").unwrap();
    }
    match RE.captures(scan_time.trim()) {
        Some(c) => format!("{}-{}-{}T{}", &c[3], &c[1], &c[2], &c[4]),
        None => scan_time.to_string(),
    }
}

pub fn write_mean_temperature(path: &Path, record: &MeanTemperatureRecord) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// Write `file_name,<label>` rows for spectral index values.
pub fn write_spectral_values(
    path: &Path,
    kind: SensorKind,
    values: &[(PathBuf, f64)],
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&["file_name", kind.label()])?;
    for (file, value) in values {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        wtr.write_record(&[name, value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}
