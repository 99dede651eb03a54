//! Map projections from geographic degrees to planar meters on a sphere.

use clap::ValueEnum;
use serde::Deserialize;
use std::f64::consts::{FRAC_PI_4, PI};

const EARTH_RADIUS: f64 = 6_378_137.0;
// Web Mercator latitude limit
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Composite Albers with Alaska, Hawaii and Puerto Rico moved next to the lower 48
    #[default]
    #[value(name = "albersUsa", alias = "albers-usa")]
    #[serde(rename = "albersUsa", alias = "albers-usa")]
    AlbersUsa,
    /// Albers equal-area conic fitted to the contiguous United States
    #[value(name = "aea")]
    #[serde(alias = "albers")]
    Aea,
    /// Spherical Mercator
    #[value(name = "merc", alias = "mercator")]
    #[serde(rename = "merc", alias = "mercator")]
    Mercator,
    /// Plate carrée
    #[value(name = "eqc", alias = "equirectangular")]
    #[serde(rename = "eqc", alias = "equirectangular")]
    Equirectangular,
    /// Sinusoidal equal-area
    #[value(name = "sinu", alias = "sinusoidal")]
    #[serde(rename = "sinu", alias = "sinusoidal")]
    Sinusoidal,
}

impl Projection {
    /// Project (longitude, latitude) in degrees to (x, y) in meters.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::AlbersUsa => albers_usa(lon, lat),
            Projection::Aea => LOWER_48.project(lon, lat),
            Projection::Mercator => {
                let phi = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
                (
                    EARTH_RADIUS * lon.to_radians(),
                    EARTH_RADIUS * (FRAC_PI_4 + phi / 2.0).tan().ln(),
                )
            }
            Projection::Equirectangular => {
                (EARTH_RADIUS * lon.to_radians(), EARTH_RADIUS * lat.to_radians())
            }
            Projection::Sinusoidal => {
                let phi = lat.to_radians();
                (EARTH_RADIUS * lon.to_radians() * phi.cos(), EARTH_RADIUS * phi)
            }
        }
    }
}

/// Albers equal-area conic on a sphere.
#[derive(Debug, Clone, Copy)]
pub struct Albers {
    lat1: f64,
    lat2: f64,
    lat0: f64,
    lon0: f64,
}

impl Albers {
    /// Standard parallels `lat1`, `lat2` and origin `lat0`, `lon0`, all in degrees.
    pub const fn new(lat1: f64, lat2: f64, lat0: f64, lon0: f64) -> Self {
        Self { lat1, lat2, lat0, lon0 }
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (phi1, phi2) = (self.lat1.to_radians(), self.lat2.to_radians());
        let n = (phi1.sin() + phi2.sin()) / 2.0;
        let c = phi1.cos().powi(2) + 2.0 * n * phi1.sin();
        let rho0 = EARTH_RADIUS * (c - 2.0 * n * self.lat0.to_radians().sin()).sqrt() / n;
        let rho = EARTH_RADIUS * (c - 2.0 * n * lat.to_radians().sin()).max(0.0).sqrt() / n;

        let mut dlon = lon - self.lon0;
        if dlon > 180.0 {
            dlon -= 360.0;
        } else if dlon < -180.0 {
            dlon += 360.0;
        }
        let theta = n * dlon * PI / 180.0;
        (rho * theta.sin(), rho0 - rho * theta.cos())
    }
}

const LOWER_48: Albers = Albers::new(29.5, 45.5, 37.5, -96.0);
const ALASKA: Albers = Albers::new(55.0, 65.0, 50.0, -154.0);
const HAWAII: Albers = Albers::new(8.0, 18.0, 13.0, -157.0);

fn albers_usa(lon: f64, lat: f64) -> (f64, f64) {
    if lat > 50.0 {
        let (x, y) = ALASKA.project(lon, lat);
        (x * 0.35 - 2_250_000.0, y * 0.35 - 1_250_000.0)
    } else if lon < -140.0 {
        let (x, y) = HAWAII.project(lon, lat);
        (x - 1_250_000.0, y - 1_750_000.0)
    } else {
        let (x, y) = LOWER_48.project(lon, lat);
        if lat < 20.0 {
            // Puerto Rico
            (x - 1_125_000.0, y + 750_000.0)
        } else {
            (x, y)
        }
    }
}
