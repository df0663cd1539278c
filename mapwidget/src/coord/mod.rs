//! Geographic coordinate value type
//!
//! Provides the immutable [`Coordinate`] used for map centers, marker
//! positions and geocoding results, plus parsing helpers for the string
//! forms that arrive through bound properties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Default tolerance for approximate coordinate comparison (degrees).
pub const COORD_EPSILON: f64 = 1e-9;

/// Errors produced when building or parsing coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180] or not finite.
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// Input could not be parsed as a number.
    #[error("Not a number: '{0}'")]
    NotANumber(String),

    /// Input is not in `lat,lng` form.
    #[error("Expected 'lat,lng', got '{0}'")]
    Malformed(String),
}

/// A geographic position in degrees.
///
/// Coordinates are plain values: once constructed they never change, and
/// equality is exact component equality. Use [`Coordinate::approx_eq`] where
/// values have passed through floating-point arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(rename = "lat")]
    latitude: f64,
    #[serde(rename = "lng")]
    longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate without range validation.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self, CoordError> {
        if !latitude.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&latitude) {
            return Err(CoordError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(MIN_LON..=MAX_LON).contains(&longitude) {
            return Err(CoordError::InvalidLongitude(longitude));
        }
        Ok(Self::new(latitude, longitude))
    }

    /// Latitude in degrees.
    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Returns a copy with the latitude replaced.
    pub fn with_latitude(self, latitude: f64) -> Self {
        Self::new(latitude, self.longitude)
    }

    /// Returns a copy with the longitude replaced.
    pub fn with_longitude(self, longitude: f64) -> Self {
        Self::new(self.latitude, longitude)
    }

    /// Compares two coordinates component-wise within `epsilon` degrees.
    pub fn approx_eq(&self, other: &Coordinate, epsilon: f64) -> bool {
        (self.latitude - other.latitude).abs() <= epsilon
            && (self.longitude - other.longitude).abs() <= epsilon
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinate {
    type Err = CoordError;

    /// Parses `lat,lng` (whitespace around either part is ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| CoordError::Malformed(s.to_string()))?;
        Coordinate::try_new(parse_degrees(lat)?, parse_degrees(lng)?)
    }
}

/// Parses a single degree value from a property string.
pub fn parse_degrees(raw: &str) -> Result<f64, CoordError> {
    let trimmed = raw.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| CoordError::NotANumber(trimmed.to_string()))?;
    if !value.is_finite() {
        return Err(CoordError::NotANumber(trimmed.to_string()));
    }
    Ok(value)
}
