//! Universal Transverse Mercator projection on the WGS84 ellipsoid.
//!
//! Series expansions follow Snyder, "Map Projections: A Working
//! Manual" (USGS 1395), good to well under a millimeter within a
//! zone.

use std::f64::consts::PI;

const K0: f64 = 0.9996;
const R: f64 = 6_378_137.;
const E: f64 = 0.006_694_38;
const FALSE_EASTING: f64 = 500_000.;
const FALSE_NORTHING: f64 = 10_000_000.;

/// A projected position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub northern: bool,
}

struct Ellipsoid {
    e_p2: f64,
    m1: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    p2: f64,
    p3: f64,
    p4: f64,
    p5: f64,
}

fn ellipsoid() -> Ellipsoid {
    let e2 = E * E;
    let e3 = e2 * E;
    let sqrt_e = (1. - E).sqrt();
    let n = (1. - sqrt_e) / (1. + sqrt_e);
    let (n2, n3, n4, n5) = (n * n, n.powi(3), n.powi(4), n.powi(5));
    Ellipsoid {
        e_p2: E / (1. - E),
        m1: 1. - E / 4. - 3. * e2 / 64. - 5. * e3 / 256.,
        m2: 3. * E / 8. + 3. * e2 / 32. + 45. * e3 / 1024.,
        m3: 15. * e2 / 256. + 45. * e3 / 1024.,
        m4: 35. * e3 / 3072.,
        p2: 3. / 2. * n - 27. / 32. * n3 + 269. / 512. * n5,
        p3: 21. / 16. * n2 - 55. / 32. * n4,
        p4: 151. / 96. * n3 - 417. / 128. * n5,
        p5: 1097. / 512. * n4,
    }
}

pub fn zone_number(longitude: f64) -> u8 {
    (((longitude + 180.) / 6.).floor() as i32).rem_euclid(60) as u8 + 1
}

fn central_longitude(zone: u8) -> f64 {
    (zone as f64 - 1.) * 6. - 180. + 3.
}

fn mod_angle(rad: f64) -> f64 {
    (rad + PI).rem_euclid(2. * PI) - PI
}

/// Project a WGS84 position into its natural zone.
pub fn from_latlon(latitude: f64, longitude: f64) -> Utm {
    let el = ellipsoid();
    let lat = latitude.to_radians();
    let (lat_sin, lat_cos) = lat.sin_cos();
    let lat_tan = lat_sin / lat_cos;
    let lat_tan2 = lat_tan * lat_tan;
    let lat_tan4 = lat_tan2 * lat_tan2;

    let zone = zone_number(longitude);
    let central = central_longitude(zone).to_radians();

    let n = R / (1. - E * lat_sin * lat_sin).sqrt();
    let c = el.e_p2 * lat_cos * lat_cos;

    let a = lat_cos * mod_angle(longitude.to_radians() - central);
    let (a2, a3, a4, a5, a6) = (a * a, a.powi(3), a.powi(4), a.powi(5), a.powi(6));

    let m = R
        * (el.m1 * lat - el.m2 * (2. * lat).sin() + el.m3 * (4. * lat).sin()
            - el.m4 * (6. * lat).sin());

    let easting = K0
        * n
        * (a + a3 / 6. * (1. - lat_tan2 + c)
            + a5 / 120. * (5. - 18. * lat_tan2 + lat_tan4 + 72. * c - 58. * el.e_p2))
        + FALSE_EASTING;

    let mut northing = K0
        * (m + n
            * lat_tan
            * (a2 / 2.
                + a4 / 24. * (5. - lat_tan2 + 9. * c + 4. * c * c)
                + a6 / 720. * (61. - 58. * lat_tan2 + lat_tan4 + 600. * c - 330. * el.e_p2)));
    if latitude < 0. {
        northing += FALSE_NORTHING;
    }

    Utm {
        easting,
        northing,
        zone,
        northern: latitude >= 0.,
    }
}

/// Inverse projection: `(latitude, longitude)` in degrees.
pub fn to_latlon(utm: &Utm) -> (f64, f64) {
    let el = ellipsoid();
    let x = utm.easting - FALSE_EASTING;
    let y = if utm.northern {
        utm.northing
    } else {
        utm.northing - FALSE_NORTHING
    };

    let m = y / K0;
    let mu = m / (R * el.m1);
    let p_rad = mu
        + el.p2 * (2. * mu).sin()
        + el.p3 * (4. * mu).sin()
        + el.p4 * (6. * mu).sin()
        + el.p5 * (8. * mu).sin();

    let (p_sin, p_cos) = p_rad.sin_cos();
    let p_tan = p_sin / p_cos;
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1. - E * p_sin * p_sin;
    let n = R / ep_sin.sqrt();
    let r = (1. - E) / ep_sin;

    let c = el.e_p2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * K0);
    let (d2, d3, d4, d5, d6) = (d * d, d.powi(3), d.powi(4), d.powi(5), d.powi(6));

    let latitude = p_rad
        - (p_tan / r)
            * (d2 / 2. - d4 / 24. * (5. + 3. * p_tan2 + 10. * c - 4. * c2 - 9. * el.e_p2))
        + d6 / 720. * (61. + 90. * p_tan2 + 298. * c + 45. * p_tan4 - 252. * el.e_p2 - 3. * c2);

    let longitude = (d - d3 / 6. * (1. + 2. * p_tan2 + c)
        + d5 / 120. * (5. - 2. * c + 28. * p_tan2 - 3. * c2 + 8. * el.e_p2 + 24. * p_tan4))
        / p_cos;
    let longitude = mod_angle(longitude + central_longitude(utm.zone).to_radians());

    (latitude.to_degrees(), longitude.to_degrees())
}
