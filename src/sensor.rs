//! Sensor families and their raw frame layouts.

use serde_derive::*;
use serde_json::Value;

/// The product family a dataset belongs to. Resolved once per
/// dataset by the orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Thermal,
    Fluorescence,
    Ndvi,
    Pri,
}

impl SensorKind {
    /// Resolve the sensor family from the measurement metadata
    /// (`sensor_fixed_metadata`, already lower-cased), the
    /// dataset name, and finally the file names.
    pub fn resolve<'a, I>(sensor_fixed: Option<&Value>, dataset_name: &str, files: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        sensor_fixed
            .and_then(Self::from_sensor_fixed)
            .or_else(|| Self::from_dataset_name(dataset_name))
            .or_else(|| Self::from_file_names(files))
    }

    pub fn from_sensor_fixed(sensor_fixed: &Value) -> Option<Self> {
        let product = sensor_fixed.get("sensor product name").and_then(Value::as_str);
        let id = sensor_fixed.get("sensor id").and_then(Value::as_str);
        match (product, id) {
            (Some("SKR 1860 DA"), _) => Some(SensorKind::Ndvi),
            (Some("SKR 1860DA"), _) | (_, Some("pri camera box")) => Some(SensorKind::Pri),
            _ => None,
        }
    }

    pub fn from_dataset_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("flirircamera") {
            Some(SensorKind::Thermal)
        } else if name.contains("ps2top") {
            Some(SensorKind::Fluorescence)
        } else if name.contains("ndvisensor") {
            Some(SensorKind::Ndvi)
        } else if name.contains("prisensor") {
            Some(SensorKind::Pri)
        } else {
            None
        }
    }

    fn from_file_names<'a, I>(files: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        files
            .into_iter()
            .any(|f| f.ends_with("_ir.bin"))
            .then(|| SensorKind::Thermal)
    }

    /// Column label used in value tables.
    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Thermal => "surface_temperature",
            SensorKind::Fluorescence => "FvFm",
            SensorKind::Ndvi => "NDVI",
            SensorKind::Pri => "PRI",
        }
    }
}

/// Width of one stored sample.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
}

impl SampleType {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
        }
    }
}

/// Fixed layout of a raw capture: `width * height` little-endian
/// samples following `header_bytes` bytes that are skipped.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: usize,
    pub height: usize,
    pub sample: SampleType,
    #[serde(default)]
    pub header_bytes: usize,
}

impl FrameLayout {
    pub const THERMAL: FrameLayout = FrameLayout {
        width: 640,
        height: 480,
        sample: SampleType::U16,
        header_bytes: 0,
    };

    pub const FLUORESCENCE: FrameLayout = FrameLayout {
        width: 1936,
        height: 1216,
        sample: SampleType::U8,
        header_bytes: 0,
    };

    pub fn num_samples(&self) -> usize {
        self.width * self.height
    }

    /// Minimum file size for a complete capture.
    pub fn byte_len(&self) -> usize {
        self.header_bytes + self.num_samples() * self.sample.bytes_per_sample()
    }
}
