//! Point, uncertainty buffer and disturbance buffer construction.
//!
//! Sources report coordinates in several reference systems. Everything
//! stored is WGS84; buffers are geodesic disks approximated by a closed ring.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::{AppError, DataProvider, Location, LocationDefaults, Point, Polygon};

const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;
const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;
const BUFFER_SEGMENTS: usize = 32;

/// Reference systems sources are known to deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CoordinateSystem {
    #[default]
    Wgs84,
    /// Coincides with WGS84 at the precision stored.
    Etrs89,
    Sweref99Tm,
    WebMercator,
}

impl CoordinateSystem {
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Self::Wgs84),
            4258 => Some(Self::Etrs89),
            3006 => Some(Self::Sweref99Tm),
            3857 | 900913 => Some(Self::WebMercator),
            _ => None,
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::Etrs89 => 4258,
            Self::Sweref99Tm => 3006,
            Self::WebMercator => 3857,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Wgs84 | Self::Etrs89)
    }

    /// Converts `(x, y)` in this system to WGS84 `(longitude, latitude)`.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 | Self::Etrs89 => (x, y),
            Self::WebMercator => web_mercator_to_wgs84(x, y),
            Self::Sweref99Tm => SWEREF99_TM.inverse(y, x),
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for CoordinateSystem {
    type Err = AppError;

    /// Accepts `4326`, `EPSG:4326` and `epsg:4326`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("epsg:"))
            .map_or(trimmed, |_| &trimmed[5..]);
        digits
            .parse::<u32>()
            .ok()
            .and_then(Self::from_epsg)
            .ok_or_else(|| AppError::Generic(format!("Unsupported coordinate system: {s}")))
    }
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Transverse Mercator projection parameters (Gauss-Krüger formulation).
struct TransverseMercator {
    semi_major_axis: f64,
    flattening: f64,
    central_meridian: f64,
    scale: f64,
    false_northing: f64,
    false_easting: f64,
}

const SWEREF99_TM: TransverseMercator = TransverseMercator {
    semi_major_axis: 6_378_137.0,
    flattening: 1.0 / 298.257_222_101,
    central_meridian: 15.0,
    scale: 0.9996,
    false_northing: 0.0,
    false_easting: 500_000.0,
};

impl TransverseMercator {
    /// Grid `(northing, easting)` to geographic `(longitude, latitude)`.
    fn inverse(&self, northing: f64, easting: f64) -> (f64, f64) {
        let f = self.flattening;
        let e2 = f * (2.0 - f);
        let n = f / (2.0 - f);
        let a_roof = self.semi_major_axis / (1.0 + n) * (1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0);

        let delta1 = n / 2.0 - 2.0 * n.powi(2) / 3.0 + 37.0 * n.powi(3) / 96.0 - n.powi(4) / 360.0;
        let delta2 = n.powi(2) / 48.0 + n.powi(3) / 15.0 - 437.0 * n.powi(4) / 1440.0;
        let delta3 = 17.0 * n.powi(3) / 480.0 - 37.0 * n.powi(4) / 840.0;
        let delta4 = 4397.0 * n.powi(4) / 161_280.0;

        let a_star = e2 + e2.powi(2) + e2.powi(3) + e2.powi(4);
        let b_star = -(7.0 * e2.powi(2) + 17.0 * e2.powi(3) + 30.0 * e2.powi(4)) / 6.0;
        let c_star = (224.0 * e2.powi(3) + 889.0 * e2.powi(4)) / 120.0;
        let d_star = -(4279.0 * e2.powi(4)) / 1260.0;

        let xi = (northing - self.false_northing) / (self.scale * a_roof);
        let eta = (easting - self.false_easting) / (self.scale * a_roof);

        let xi_prim = xi
            - delta1 * (2.0 * xi).sin() * (2.0 * eta).cosh()
            - delta2 * (4.0 * xi).sin() * (4.0 * eta).cosh()
            - delta3 * (6.0 * xi).sin() * (6.0 * eta).cosh()
            - delta4 * (8.0 * xi).sin() * (8.0 * eta).cosh();
        let eta_prim = eta
            - delta1 * (2.0 * xi).cos() * (2.0 * eta).sinh()
            - delta2 * (4.0 * xi).cos() * (4.0 * eta).sinh()
            - delta3 * (6.0 * xi).cos() * (6.0 * eta).sinh()
            - delta4 * (8.0 * xi).cos() * (8.0 * eta).sinh();

        let phi_star = (xi_prim.sin() / eta_prim.cosh()).asin();
        let delta_lambda = (eta_prim.sinh() / xi_prim.cos()).atan();

        let sin_phi = phi_star.sin();
        let lat = phi_star
            + sin_phi
                * phi_star.cos()
                * (a_star
                    + b_star * sin_phi.powi(2)
                    + c_star * sin_phi.powi(4)
                    + d_star * sin_phi.powi(6));
        let lon = self.central_meridian.to_radians() + delta_lambda;

        (lon.to_degrees(), lat.to_degrees())
    }
}

/// Coordinates and radii as delivered by a source record.
#[derive(Debug, Clone, Default)]
pub struct PositionInput {
    pub longitude: f64,
    pub latitude: f64,
    pub coordinate_system: CoordinateSystem,
    pub coordinate_uncertainty_in_meters: Option<i32>,
    pub disturbance_radius_in_meters: Option<i32>,
    pub verbatim_longitude: Option<String>,
    pub verbatim_latitude: Option<String>,
}

impl PositionInput {
    /// Sources use zero or negative values for missing coordinates.
    pub fn has_coordinates(&self) -> bool {
        self.longitude > 0.0 && self.latitude > 0.0
    }
}

/// Builds the location part of a processed observation.
#[derive(Debug, Clone, Default)]
pub struct GeoPositioner {
    defaults: LocationDefaults,
}

impl GeoPositioner {
    pub fn new(defaults: LocationDefaults) -> Self {
        Self { defaults }
    }

    /// Uncertainty radius after applying the provider default and the ceiling.
    pub fn coordinate_uncertainty(&self, supplied: Option<i32>, provider: &DataProvider) -> i32 {
        let uncertainty = match supplied {
            Some(value) if value > 0 => value,
            _ => provider.coordinate_uncertainty_in_meters,
        };
        uncertainty.min(self.defaults.max_coordinate_uncertainty_in_meters)
    }

    /// Computes the WGS84 location for a record.
    ///
    /// Missing coordinates produce a location without point or buffers; this
    /// is not an error.
    pub fn position(&self, input: &PositionInput, provider: &DataProvider) -> Location {
        let mut location = Location {
            // Stored coordinates are always WGS 84.
            geodetic_datum: Some(CoordinateSystem::Wgs84.to_string()),
            verbatim_coordinate_system: Some(input.coordinate_system.to_string()),
            verbatim_longitude: input.verbatim_longitude.clone(),
            verbatim_latitude: input.verbatim_latitude.clone(),
            continent: Some(self.defaults.continent.clone()),
            country: Some(self.defaults.country.clone()),
            ..Location::default()
        };

        if !input.has_coordinates() {
            return location;
        }

        let point = self.to_wgs84_point(input);
        let uncertainty =
            self.coordinate_uncertainty(input.coordinate_uncertainty_in_meters, provider);

        location.decimal_longitude = Some(round5(point.x));
        location.decimal_latitude = Some(round5(point.y));
        location.coordinate_uncertainty_in_meters = Some(uncertainty);
        location.point_with_buffer = Some(buffer(&point, f64::from(uncertainty)));
        location.point_with_disturbance_buffer = input
            .disturbance_radius_in_meters
            .filter(|radius| *radius > 0)
            .map(|radius| buffer(&point, f64::from(radius)));
        location.point = Some(point);

        location
    }

    fn to_wgs84_point(&self, input: &PositionInput) -> Point {
        if input.coordinate_system.is_geographic() {
            return Point::new(input.longitude, input.latitude);
        }

        let started = Instant::now();
        let (lon, lat) = input
            .coordinate_system
            .to_wgs84(input.longitude, input.latitude);
        tracing::trace!(
            from = %input.coordinate_system,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Reprojected point to WGS84"
        );
        Point::new(lon, lat)
    }
}

/// Geodesic disk of `radius_m` meters around `center` as a closed ring.
pub fn buffer(center: &Point, radius_m: f64) -> Polygon {
    let lat1 = center.y.to_radians();
    let lon1 = center.x.to_radians();
    let angular = radius_m / EARTH_MEAN_RADIUS_M;

    let mut exterior: Vec<Point> = (0..BUFFER_SEGMENTS)
        .map(|i| {
            let bearing = 2.0 * PI * i as f64 / BUFFER_SEGMENTS as f64;
            let lat2 = (lat1.sin() * angular.cos()
                + lat1.cos() * angular.sin() * bearing.cos())
            .asin();
            let lon2 = lon1
                + (bearing.sin() * angular.sin() * lat1.cos())
                    .atan2(angular.cos() - lat1.sin() * lat2.sin());
            Point::new(lon2.to_degrees(), lat2.to_degrees())
        })
        .collect();
    exterior.push(exterior[0]);

    Polygon { exterior }
}

/// Great-circle distance in meters.
pub fn haversine_distance(a: &Point, b: &Point) -> f64 {
    let d_lat = (b.y - a.y).to_radians();
    let d_lon = (b.x - a.x).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.y.to_radians().cos() * b.y.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().asin()
}

pub(crate) fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}
