//! Convert raw thermal sensor counts to temperatures.
//!
//! The calibrated path is the radiometric model used by FLIR
//! cameras: the raw count of a pixel is the sum of radiance from
//! the object (attenuated by emissivity and the atmosphere), from
//! the atmosphere itself, and from the ambient scene reflected off
//! the object. Removing the last two and inverting the Planck
//! response gives the object temperature.
//!
//! Captures without calibration constants store deci-Kelvin and
//! are converted linearly.

use ndarray::Array2;
use serde_derive::*;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    decode::RawFrame,
    error::{Error, Result},
    metadata::require_f64,
};

const CELSIUS_OFFSET: f64 = 273.15;

/// Viewing conditions assumed when computing temperatures.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AmbientConditions {
    /// Atmospheric and reflected apparent temperature, °C.
    pub temperature_c: f64,
    pub relative_humidity: f64,
    /// Object distance, meters.
    pub distance_m: f64,
    pub emissivity: f64,
}

impl Default for AmbientConditions {
    fn default() -> Self {
        AmbientConditions {
            temperature_c: 22.0,
            relative_humidity: 0.1,
            distance_m: 2.5,
            emissivity: 0.98,
        }
    }
}

/// Per-sensor response constants from `sensor_fixed_metadata`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationParameters {
    pub calibrated: bool,

    pub r: f64,
    pub b: f64,
    pub f: f64,
    pub j0: f64,
    pub j1: f64,

    pub alpha_1: f64,
    pub alpha_2: f64,
    pub beta_1: f64,
    pub beta_2: f64,
    pub x: f64,
}

impl CalibrationParameters {
    pub fn uncalibrated() -> Self {
        Self::default()
    }

    /// Read constants from a lower-cased `sensor_fixed_metadata`
    /// object. Any missing or malformed constant yields the
    /// uncalibrated fallback.
    pub fn from_sensor_fixed(sensor_fixed: &Map<String, Value>) -> Self {
        let calibrated = match sensor_fixed.get("calibrated") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        if !calibrated {
            return Self::uncalibrated();
        }

        let parsed = (|| -> Result<Self> {
            Ok(CalibrationParameters {
                calibrated: true,
                r: require_f64(sensor_fixed, "calibration r")?,
                b: require_f64(sensor_fixed, "calibration b")?,
                f: require_f64(sensor_fixed, "calibration f")?,
                j0: require_f64(sensor_fixed, "calibration j0")?,
                j1: require_f64(sensor_fixed, "calibration j1")?,
                alpha_1: require_f64(sensor_fixed, "calibration alpha1")?,
                alpha_2: require_f64(sensor_fixed, "calibration alpha2")?,
                beta_1: require_f64(sensor_fixed, "calibration beta1")?,
                beta_2: require_f64(sensor_fixed, "calibration beta2")?,
                x: require_f64(sensor_fixed, "calibration x")?,
            })
        })();

        parsed.unwrap_or_else(|e| {
            warn!("incomplete calibration constants ({}); using uncalibrated conversion", e);
            Self::uncalibrated()
        })
    }

    // R*J1/(exp(B/T)-F) + J0, T in Kelvin
    fn planck_temp_to_raw(&self, kelvin: f64) -> f64 {
        self.r * self.j1 / ((self.b / kelvin).exp() - self.f) + self.j0
    }

    // B/ln(R/(raw-J0)*J1 + F) - 273.15
    fn planck_raw_to_temp(&self, raw: f64) -> f64 {
        self.b / (self.r / (raw - self.j0) * self.j1 + self.f).ln() - CELSIUS_OFFSET
    }

    fn atmospheric_transmission(&self, ambient: &AmbientConditions) -> f64 {
        // water vapour content from relative humidity and temperature
        const H2O_SERIES: [f64; 4] = [1.56, 0.0694, -0.000278, 0.000000685];
        let h2o = ambient.relative_humidity
            * power_series_at(&H2O_SERIES, ambient.temperature_c).exp();
        let h2o_sqrt = h2o.sqrt();

        let dist_factor = (ambient.distance_m / 2.).sqrt();
        let exp1 = (-dist_factor * (self.alpha_1 + self.beta_1 * h2o_sqrt)).exp();
        let exp2 = (-dist_factor * (self.alpha_2 + self.beta_2 * h2o_sqrt)).exp();

        self.x * exp1 + (1. - self.x) * exp2
    }

    /// Per-pixel raw-count to °C transform.
    pub fn temperature_transform(&self, ambient: &AmbientConditions) -> Box<dyn Fn(f64) -> f64> {
        let params = *self;
        if !params.calibrated {
            return Box::new(|raw: f64| raw / 10. - CELSIUS_OFFSET);
        }

        let tau = params.atmospheric_transmission(ambient);
        let emissivity = ambient.emissivity;
        // atmosphere and ambient share the same temperature
        let kelvin = ambient.temperature_c + CELSIUS_OFFSET;
        let atm_rad = (1. - tau) * params.planck_temp_to_raw(kelvin);
        let amb_refl_rad = (1. - emissivity) * tau * params.planck_temp_to_raw(kelvin);
        debug!(tau, atm_rad, amb_refl_rad, "calibrated transform");

        let coeffs = [atm_rad + amb_refl_rad, emissivity * tau];
        Box::new(move |raw: f64| params.planck_raw_to_temp(power_series_at(&coeffs, raw)))
    }
}

/// Convert a thermal frame to °C. Fails if any pixel has no finite
/// temperature.
pub fn calibrate(
    frame: &RawFrame,
    calib: &CalibrationParameters,
    ambient: &AmbientConditions,
) -> Result<Array2<f64>> {
    let temp_t = calib.temperature_transform(ambient);
    let temps = frame.to_f64().mapv(|raw| temp_t(raw));

    if let Some(((row, col), val)) = temps.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(Error::Calibration(format!(
            "non-finite temperature {} at pixel ({}, {})",
            val, row, col
        )));
    }
    Ok(temps)
}

#[inline]
fn power_series_at(coeffs: &[f64], x: f64) -> f64 {
    let mut pow = 1.;
    let mut sum = 0.;
    for coeff in coeffs.iter() {
        sum += pow * coeff;
        pow *= x;
    }
    sum
}
