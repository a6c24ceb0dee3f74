//! Geographic projection collaborator
//!
//! The estimator works in a planar metric frame. [`Geodesy`] converts between
//! that frame and latitude/longitude; production deployments plug in a UTM
//! implementation, while [`LocalTangentPlane`] covers small areas.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::results::LatLon;
use crate::types::spaces::PlanarState;

/// Latitude band letters used by UTM, south to north.
const LATITUDE_BANDS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";

/// A UTM-style grid zone: longitude zone number plus latitude band letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    pub number: u8,
    pub band: char,
}

impl Zone {
    /// The grid zone containing a position.
    pub fn containing(lat: f64, lon: f64) -> Self {
        let number = (((lon + 180.0) / 6.0).floor() as i64).clamp(0, 59) as u8 + 1;
        let idx = (((lat + 80.0) / 8.0).floor() as i64).clamp(0, LATITUDE_BANDS.len() as i64 - 1);
        Self {
            number,
            band: LATITUDE_BANDS[idx as usize] as char,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.band)
    }
}

/// Conversion between geographic and planar coordinates.
pub trait Geodesy: Send + Sync {
    /// Returns `(northing, easting)` in metres.
    fn latlon_to_planar(&self, lat: f64, lon: f64) -> (f64, f64);

    /// Inverse projection within `zone`.
    fn planar_to_latlon(&self, northing: f64, easting: f64, zone: Zone) -> (f64, f64);

    /// The grid zone a position falls in.
    fn zone_of(&self, lat: f64, lon: f64) -> Zone {
        Zone::containing(lat, lon)
    }

    /// Projects a position to a planar state.
    fn project(&self, location: LatLon) -> PlanarState {
        let (northing, easting) = self.latlon_to_planar(location.lat, location.lon);
        PlanarState::planar(easting, northing)
    }

    /// Unprojects a planar state.
    fn unproject(&self, state: &PlanarState, zone: Zone) -> LatLon {
        let (lat, lon) = self.planar_to_latlon(state.northing(), state.easting(), zone);
        LatLon::new(lat, lon)
    }
}

/// Equirectangular projection about a fixed origin.
///
/// Accurate to well under a metre over the tens of kilometres a mission
/// typically spans; zones are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTangentPlane {
    origin: LatLon,
    false_easting: f64,
    false_northing: f64,
    metres_per_deg_lat: f64,
    metres_per_deg_lon: f64,
}

impl LocalTangentPlane {
    /// Mean Earth radius, metres.
    pub const EARTH_RADIUS: f64 = 6_371_008.8;

    /// Creates a plane whose origin maps to `(0, 0)`.
    pub fn new(origin: LatLon) -> Self {
        Self::with_false_origin(origin, 0.0, 0.0)
    }

    /// Creates a plane whose origin maps to `(false_easting, false_northing)`.
    pub fn with_false_origin(origin: LatLon, false_easting: f64, false_northing: f64) -> Self {
        let metres_per_deg_lat = Self::EARTH_RADIUS.to_radians();
        Self {
            origin,
            false_easting,
            false_northing,
            metres_per_deg_lat,
            metres_per_deg_lon: metres_per_deg_lat * origin.lat.to_radians().cos(),
        }
    }

    #[inline]
    pub fn origin(&self) -> LatLon {
        self.origin
    }
}

impl Geodesy for LocalTangentPlane {
    fn latlon_to_planar(&self, lat: f64, lon: f64) -> (f64, f64) {
        let northing = self.false_northing + (lat - self.origin.lat) * self.metres_per_deg_lat;
        let easting = self.false_easting + (lon - self.origin.lon) * self.metres_per_deg_lon;
        (northing, easting)
    }

    fn planar_to_latlon(&self, northing: f64, easting: f64, _zone: Zone) -> (f64, f64) {
        let lat = self.origin.lat + (northing - self.false_northing) / self.metres_per_deg_lat;
        let lon = self.origin.lon + (easting - self.false_easting) / self.metres_per_deg_lon;
        (lat, lon)
    }
}
