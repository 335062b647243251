//! Ground bounding boxes from gantry position records.
//!
//! Gantry coordinates are meters along the rails. Two resolvers
//! are provided, and they do not share an axis convention.
//!
//! [`great_circle_bounds`] treats offsets as planar arcs and
//! subtracts both from a fixed reference corner: latitude falls as
//! `x` grows and longitude falls (westward) as `y` grows.
//!
//! [`affine_bounds`] maps gantry coordinates into UTM with a
//! surveyed affine fit, where northing rises with `x` and easting
//! falls with `y`, then projects back to WGS84. Captures after the
//! field was re-surveyed need it.

use std::f64::consts::PI;

use serde_derive::*;
use tracing::debug;

use crate::{
    error::{Error, Result},
    metadata::{FieldOfView, PositionRecord},
    utm::{self, Utm},
};

const EARTH_RADIUS: f64 = 6_378_137.;

/// Origin of the great-circle offsets, `(lat, lon)`.
pub const REFERENCE_CORNER: (f64, f64) = (33.0745, -111.97475);

// Surveyed fit: gantry (x, y) -> UTM zone 12N (easting, northing)
const AFFINE_X: [f64; 3] = [409_012.2032, 0.009, -0.9986];
const AFFINE_Y: [f64; 3] = [3_659_974.971, 1.0002, 0.0078];
const SURVEY_CORNER: (f64, f64) = (33.074_518_69, -111.974_777_75);
const LON_SHIFT: f64 = 0.000_020_308_287;
const LAT_SHIFT: f64 = 0.000_015_258_894;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GeolocationStrategy {
    GreatCircle,
    #[serde(alias = "affine")]
    SurveyedAffine,
}

impl Default for GeolocationStrategy {
    fn default() -> Self {
        GeolocationStrategy::GreatCircle
    }
}

impl std::str::FromStr for GeolocationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "great-circle" => Ok(GeolocationStrategy::GreatCircle),
            "affine" | "surveyed-affine" => Ok(GeolocationStrategy::SurveyedAffine),
            _ => Err(Error::Config(format!("unknown geolocation strategy `{}`", s))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct GeolocationConfig {
    pub strategy: GeolocationStrategy,
    /// Scale the field of view with platform height.
    pub height_corrected_fov: bool,
}

/// Geographic extent in degrees.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_max: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lon_min: f64,
}

impl BoundingBox {
    /// `(lat_max, lat_min, lon_max, lon_min)`
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.lat_max, self.lat_min, self.lon_max, self.lon_min)
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }

    fn validated(self) -> Result<Self> {
        if self.lat_max > self.lat_min && self.lon_max > self.lon_min {
            Ok(self)
        } else {
            Err(Error::Metadata(format!("degenerate bounding box: {:?}", self)))
        }
    }
}

fn check_fov(fov: &FieldOfView) -> Result<()> {
    if fov.x > 0. && fov.y > 0. && fov.x.is_finite() && fov.y.is_finite() {
        Ok(())
    } else {
        Err(Error::Metadata(format!(
            "field of view must be positive, got {} x {}",
            fov.x, fov.y
        )))
    }
}

/// Planar offsets from [`REFERENCE_CORNER`]; latitude falls as `x`
/// grows and longitude falls as `y` grows.
pub fn great_circle_bounds(center: [f64; 3], fov: &FieldOfView) -> Result<BoundingBox> {
    check_fov(fov)?;
    let (ref_lat, ref_lon) = REFERENCE_CORNER;
    let deg = 180. / PI;
    let lon_radius = EARTH_RADIUS * ref_lat.to_radians().cos();

    let lat = |x: f64| ref_lat - x / EARTH_RADIUS * deg;
    let lon = |y: f64| ref_lon - y / lon_radius * deg;

    BoundingBox {
        lat_max: lat(center[0] - fov.x / 2.),
        lat_min: lat(center[0] + fov.x / 2.),
        lon_max: lon(center[1] - fov.y / 2.),
        lon_min: lon(center[1] + fov.y / 2.),
    }
    .validated()
}

fn gantry_to_utm(x: f64, y: f64, zone: u8) -> Utm {
    Utm {
        easting: AFFINE_X[0] + AFFINE_X[1] * x + AFFINE_X[2] * y,
        northing: AFFINE_Y[0] + AFFINE_Y[1] * x + AFFINE_Y[2] * y,
        zone,
        northern: true,
    }
}

/// Surveyed affine fit through UTM, with the fixed post-projection
/// shift.
pub fn affine_bounds(center: [f64; 3], fov: &FieldOfView) -> Result<BoundingBox> {
    check_fov(fov)?;
    let zone = utm::zone_number(SURVEY_CORNER.1);

    let (x_n, x_s) = (center[0] + fov.x / 2., center[0] - fov.x / 2.);
    let (y_w, y_e) = (center[1] + fov.y / 2., center[1] - fov.y / 2.);

    let (nw_lat, nw_lon) = utm::to_latlon(&gantry_to_utm(x_n, y_w, zone));
    let (se_lat, se_lon) = utm::to_latlon(&gantry_to_utm(x_s, y_e, zone));
    debug!(nw_lat, nw_lon, se_lat, se_lon, "affine corners");

    BoundingBox {
        lat_max: nw_lat - LAT_SHIFT,
        lat_min: se_lat - LAT_SHIFT,
        lon_max: se_lon + LON_SHIFT,
        lon_min: nw_lon + LON_SHIFT,
    }
    .validated()
}

/// Resolve the extent of a capture with the configured strategy.
pub fn resolve(position: &PositionRecord, config: &GeolocationConfig) -> Result<BoundingBox> {
    let center = position.center();
    let fov = if config.height_corrected_fov {
        position.fov.height_corrected(center[2])
    } else {
        position.fov
    };
    match config.strategy {
        GeolocationStrategy::GreatCircle => great_circle_bounds(center, &fov),
        GeolocationStrategy::SurveyedAffine => affine_bounds(center, &fov),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOV: FieldOfView = FieldOfView { x: 0.1, y: 0.1 };

    #[test]
    fn origin_stays_near_reference() {
        let bbox = great_circle_bounds([0., 0., 0.], &FOV).unwrap();
        let (lat, lon) = REFERENCE_CORNER;
        let (lat_max, lat_min, lon_max, lon_min) = bbox.as_tuple();
        for v in [lat_max, lat_min].iter() {
            assert!((v - lat).abs() < 1e-3);
        }
        for v in [lon_max, lon_min].iter() {
            assert!((v - lon).abs() < 1e-3);
        }
        assert!(bbox.contains(lat, lon));
    }

    #[test]
    fn extents_are_ordered() {
        let centers = [[0., 0., 0.], [120.5, 3.25, 1.], [210., 22., 2.5], [-5., -5., 0.]];
        let fovs = [FOV, FieldOfView { x: 1.5, y: 1.125 }, FieldOfView { x: 20., y: 0.01 }];
        for c in centers.iter() {
            for f in fovs.iter() {
                for bbox in [great_circle_bounds(*c, f), affine_bounds(*c, f)].iter() {
                    let bbox = bbox.as_ref().unwrap();
                    assert!(bbox.lat_max > bbox.lat_min, "{:?}", bbox);
                    assert!(bbox.lon_max > bbox.lon_min, "{:?}", bbox);
                }
            }
        }
    }

    #[test]
    fn great_circle_offsets_run_south_and_west() {
        let near = great_circle_bounds([1., 1., 0.], &FOV).unwrap();
        let far = great_circle_bounds([100., 10., 0.], &FOV).unwrap();
        assert!(far.lat_max < near.lat_max);
        assert!(far.lon_max < near.lon_max);
        assert!(near.lat_max < REFERENCE_CORNER.0);
        assert!(near.lon_max < REFERENCE_CORNER.1);
    }

    #[test]
    fn affine_x_runs_north() {
        let near = affine_bounds([1., 1., 0.], &FOV).unwrap();
        let far = affine_bounds([100., 1., 0.], &FOV).unwrap();
        assert!(far.lat_min > near.lat_min);
    }

    #[test]
    fn affine_near_field_corner() {
        let bbox = affine_bounds([0., 0., 0.], &FOV).unwrap();
        let (lat, lon) = SURVEY_CORNER;
        assert!((bbox.lat_min - lat).abs() < 1e-3);
        assert!((bbox.lon_max - lon).abs() < 1e-3);
    }

    #[test]
    fn non_positive_fov_is_rejected() {
        let err = great_circle_bounds([0.; 3], &FieldOfView { x: -1., y: 1. }).unwrap_err();
        assert!(matches!(err, Error::Metadata(_)));
        assert!(affine_bounds([0.; 3], &FieldOfView { x: 1., y: 0. }).is_err());
    }

    #[test]
    fn height_correction_widens_fov() {
        let position = PositionRecord {
            gantry: [10., 10., 3.],
            sensor_offset: [0.; 3],
            fov: FOV,
            scan_time: String::new(),
        };
        let plain = resolve(&position, &GeolocationConfig::default()).unwrap();
        let corrected = resolve(
            &position,
            &GeolocationConfig {
                height_corrected_fov: true,
                ..Default::default()
            },
        )
        .unwrap();
        let width = |b: &BoundingBox| b.lat_max - b.lat_min;
        assert!((width(&corrected) / width(&plain) - 2.).abs() < 1e-6);
    }

    #[test]
    fn strategy_names() {
        assert_eq!(
            "affine".parse::<GeolocationStrategy>().unwrap(),
            GeolocationStrategy::SurveyedAffine
        );
        assert!("utm".parse::<GeolocationStrategy>().is_err());
    }
}
