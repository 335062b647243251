//! Sidecar measurement metadata.
//!
//! Field scanner captures ship with a JSON record holding a
//! `lemnatec_measurement_metadata` object, which in turn carries
//! `gantry_system_variable_metadata` (platform position, capture
//! time) and `sensor_fixed_metadata` (camera offsets, field of
//! view, calibration constants). Key case varies across record
//! vintages, so every key is lower-cased on load.

use std::{fs::File, io::BufReader, path::Path};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const MEASUREMENT_KEY: &str = "lemnatec_measurement_metadata";
const GANTRY_KEY: &str = "gantry_system_variable_metadata";
const SENSOR_FIXED_KEY: &str = "sensor_fixed_metadata";

/// Recursively lower-case all object keys.
pub fn lower_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lower_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

/// Read a float from a JSON number or a string such as `"2.5"` or
/// `"1.5 m"`.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap();
    }
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => RE.find(s).and_then(|m| m.as_str().trim().parse().ok()),
        _ => None,
    }
}

/// The `lemnatec_measurement_metadata` object of one dataset.
#[derive(Debug, Clone)]
pub struct MeasurementMetadata {
    root: Map<String, Value>,
}

impl MeasurementMetadata {
    /// Extract from a record that carries the measurement object
    /// either at top level or under `content` (platform records).
    pub fn from_record(record: &Value) -> Option<Self> {
        let record = lower_keys(record.clone());
        let found = record
            .get(MEASUREMENT_KEY)
            .or_else(|| record.get("content").and_then(|c| c.get(MEASUREMENT_KEY)))?;
        found.as_object().map(|root| MeasurementMetadata { root: root.clone() })
    }

    /// First record in `records` carrying measurement metadata.
    pub fn find_in_records(records: &[Value]) -> Option<Self> {
        records.iter().find_map(Self::from_record)
    }

    /// Load a sidecar file: either a single record or a list of
    /// platform records (`*_dataset_metadata.json`).
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let value: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Metadata(format!("corrupt metadata file {}: {}", path.display(), e)))?;
        let found = match &value {
            Value::Array(records) => Self::find_in_records(records),
            record => Self::from_record(record),
        };
        found.ok_or_else(|| Error::missing_key(MEASUREMENT_KEY))
    }

    fn section(&self, key: &str) -> Result<&Map<String, Value>> {
        self.root
            .get(key)
            .and_then(Value::as_object)
            .ok_or_else(|| Error::missing_key(key))
    }

    pub fn sensor_fixed(&self) -> Option<&Value> {
        self.root.get(SENSOR_FIXED_KEY)
    }

    pub fn sensor_fixed_map(&self) -> Result<&Map<String, Value>> {
        self.section(SENSOR_FIXED_KEY)
    }

    pub fn position(&self) -> Result<PositionRecord> {
        let gantry = self.section(GANTRY_KEY)?;
        let camera = self.section(SENSOR_FIXED_KEY)?;

        let scan_time = gantry
            .get("time")
            .map(|t| match t {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| Error::missing_key("time"))?;

        Ok(PositionRecord {
            gantry: [
                require_f64(gantry, "position x [m]")?,
                require_f64(gantry, "position y [m]")?,
                require_f64(gantry, "position z [m]")?,
            ],
            sensor_offset: [
                require_f64(camera, "location in camera box x [m]")?,
                require_f64(camera, "location in camera box y [m]")?,
                // absent from older records
                optional_f64(camera, "location in camera box z [m]")?.unwrap_or(0.),
            ],
            fov: FieldOfView {
                x: require_f64(camera, "field of view x [m]")?,
                y: require_f64(camera, "field of view y [m]")?,
            },
            scan_time,
        })
    }
}

fn optional_f64(map: &Map<String, Value>, key: &str) -> Result<Option<f64>> {
    map.get(key)
        .map(|v| {
            value_as_f64(v)
                .ok_or_else(|| Error::Metadata(format!("key `{}` is not a number: {}", key, v)))
        })
        .transpose()
}

pub(crate) fn require_f64(map: &Map<String, Value>, key: &str) -> Result<f64> {
    optional_f64(map, key)?.ok_or_else(|| Error::missing_key(key))
}

/// Ground footprint of a sensor in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub x: f64,
    pub y: f64,
}

impl FieldOfView {
    /// Footprint scaled for platform height (`z` in meters).
    pub fn height_corrected(&self, height: f64) -> Self {
        const HEIGHT_OFFSET: f64 = 1.0;
        let factor = (height + HEIGHT_OFFSET) / 2.;
        FieldOfView {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

/// Platform and sensor position at capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub gantry: [f64; 3],
    pub sensor_offset: [f64; 3],
    pub fov: FieldOfView,
    pub scan_time: String,
}

impl PositionRecord {
    pub fn center(&self) -> [f64; 3] {
        [
            self.gantry[0] + self.sensor_offset[0],
            self.gantry[1] + self.sensor_offset[1],
            self.gantry[2] + self.sensor_offset[2],
        ]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_record() -> Value {
        json!({
            "lemnatec_measurement_metadata": {
                "gantry_system_variable_metadata": {
                    "time": "08/22/2016 14:33:26",
                    "Position x [m]": "10.5",
                    "position y [m]": 20.25,
                    "position z [m]": "0.75"
                },
                "sensor_fixed_metadata": {
                    "location in camera box x [m]": "0.877",
                    "location in camera box y [m]": "1.4",
                    "field of view x [m]": "1.5",
                    "field of view y [m]": 1.125,
                    "sensor product name": "A615"
                }
            }
        })
    }

    #[test]
    fn keys_are_lowered_recursively() {
        let v = lower_keys(json!({"A": {"B": [{"C": 1}]}}));
        assert_eq!(v, json!({"a": {"b": [{"c": 1}]}}));
    }

    #[test]
    fn numbers_from_strings() {
        assert_eq!(value_as_f64(&json!("2.5")), Some(2.5));
        assert_eq!(value_as_f64(&json!("-0.25 m")), Some(-0.25));
        assert_eq!(value_as_f64(&json!(3)), Some(3.));
        assert_eq!(value_as_f64(&json!("n/a")), None);
        assert_eq!(value_as_f64(&json!(null)), None);
    }

    #[test]
    fn position_with_default_z_offset() {
        let md = MeasurementMetadata::from_record(&sample_record()).unwrap();
        let pos = md.position().unwrap();
        assert_eq!(pos.sensor_offset[2], 0.);
        let c = pos.center();
        assert!((c[0] - 11.377).abs() < 1e-12);
        assert!((c[1] - 21.65).abs() < 1e-12);
        assert!((c[2] - 0.75).abs() < 1e-12);
        assert_eq!(pos.fov, FieldOfView { x: 1.5, y: 1.125 });
        assert_eq!(pos.scan_time, "08/22/2016 14:33:26");
    }

    #[test]
    fn missing_key_is_named() {
        let mut record = sample_record();
        record["lemnatec_measurement_metadata"]["sensor_fixed_metadata"]
            .as_object_mut()
            .unwrap()
            .remove("field of view x [m]");
        let md = MeasurementMetadata::from_record(&record).unwrap();
        match md.position() {
            Err(Error::Metadata(msg)) => assert!(msg.contains("field of view x [m]")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn found_under_platform_content() {
        let records = vec![
            json!({"agent": {"name": "other"}, "content": {"status": "COMPLETED"}}),
            json!({"content": sample_record()}),
        ];
        assert!(MeasurementMetadata::find_in_records(&records).is_some());
    }

    #[test]
    fn height_corrected_fov() {
        let fov = FieldOfView { x: 1.0, y: 2.0 }.height_corrected(3.0);
        assert_eq!(fov, FieldOfView { x: 2.0, y: 4.0 });
    }
}
