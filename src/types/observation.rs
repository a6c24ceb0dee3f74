//! Observation data model
//!
//! [`ObservationReport`] is what callers submit: geographic sensor positions
//! plus a raw measurement. Once validated and projected it becomes an
//! [`Observation`], the planar form the estimator consumes.

use core::fmt;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::models::display::DisplayGeometry;
use crate::models::geodesy::Geodesy;
use crate::types::results::LatLon;
use crate::types::spaces::PlanarState;

/// Caller-assigned observation identifier. Re-using an id replaces the observation.
pub type ObservationId = u64;

/// Identifier of the asset (sensor platform) that produced an observation.
pub type AssetId = String;

// ============================================================================
// Errors
// ============================================================================

/// Rejection reasons for a submitted observation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObservationError {
    #[error("observation {id}: latitude {lat} of asset '{asset}' is outside [-90, 90]")]
    InvalidLatitude {
        id: ObservationId,
        asset: AssetId,
        lat: f64,
    },

    #[error("observation {id}: longitude {lon} of asset '{asset}' is outside [-180, 180]")]
    InvalidLongitude {
        id: ObservationId,
        asset: AssetId,
        lon: f64,
    },

    #[error("observation {id}: no asset id was specified")]
    MissingAsset { id: ObservationId },

    #[error("observation {id}: range must be positive, got {value}")]
    NonPositiveRange { id: ObservationId, value: f64 },

    #[error("observation {id}: TDOA requires a paired sensor")]
    MissingPairedSensor { id: ObservationId },

    #[error("observation {id}: bearing {value} rad is outside [0, 2π]")]
    BearingOutOfRange { id: ObservationId, value: f64 },

    #[error("observation {id}: measurement value is not finite")]
    NonFiniteValue { id: ObservationId },

    #[error("observation {id}: measurement variance {variance} is invalid")]
    InvalidVariance { id: ObservationId, variance: f64 },

    #[error("no default measurement variance configured for {kind} observations")]
    MissingDefaultVariance { kind: ObservationKind },
}

// ============================================================================
// Observation Kind
// ============================================================================

/// The three supported measurement types.
///
/// The derived ordering places AOA last; working sets are sorted by kind so
/// bearings are always fused after every range and TDOA observation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Range,
    Tdoa,
    Aoa,
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationKind::Range => write!(f, "range"),
            ObservationKind::Tdoa => write!(f, "tdoa"),
            ObservationKind::Aoa => write!(f, "aoa"),
        }
    }
}

// ============================================================================
// Planar Observation
// ============================================================================

/// A sensor platform at a planar position.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub asset: AssetId,
    pub position: PlanarState,
}

impl Sensor {
    #[inline]
    pub fn new(asset: impl Into<AssetId>, position: PlanarState) -> Self {
        Self {
            asset: asset.into(),
            position,
        }
    }
}

/// Sensor geometry of an observation, one variant per measurement type.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationGeometry {
    /// Distance from `sensor` to the target, metres.
    Range { sensor: Sensor },
    /// Arrival-time difference at `sensor` minus `paired`, seconds.
    Tdoa { sensor: Sensor, paired: Sensor },
    /// Bearing from `sensor` to the target, radians counter-clockwise from east.
    Aoa { sensor: Sensor },
}

impl ObservationGeometry {
    #[inline]
    pub fn kind(&self) -> ObservationKind {
        match self {
            ObservationGeometry::Range { .. } => ObservationKind::Range,
            ObservationGeometry::Tdoa { .. } => ObservationKind::Tdoa,
            ObservationGeometry::Aoa { .. } => ObservationKind::Aoa,
        }
    }

    /// The sensor that owns the observation.
    #[inline]
    pub fn sensor(&self) -> &Sensor {
        match self {
            ObservationGeometry::Range { sensor }
            | ObservationGeometry::Tdoa { sensor, .. }
            | ObservationGeometry::Aoa { sensor } => sensor,
        }
    }

    /// Every sensor referenced, primary first.
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        let paired = match self {
            ObservationGeometry::Tdoa { paired, .. } => Some(paired),
            _ => None,
        };
        core::iter::once(self.sensor()).chain(paired)
    }

    /// True when `asset` participates in this observation.
    pub fn references(&self, asset: &str) -> bool {
        self.sensors().any(|s| s.asset == asset)
    }
}

/// A validated observation in planar coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: ObservationId,
    pub geometry: ObservationGeometry,
    /// Raw measurement: metres, seconds or radians depending on kind.
    pub value: f64,
    /// Measurement variance in the measurement domain.
    pub variance: f64,
    /// Value of the observation this one replaced, if any.
    pub previous_value: Option<f64>,
    /// Plottable geometry, only computed when the mission asks for it.
    pub display: Option<DisplayGeometry>,
}

impl Observation {
    #[inline]
    pub fn kind(&self) -> ObservationKind {
        self.geometry.kind()
    }
}

// ============================================================================
// Submitted Observation
// ============================================================================

/// A sensor location as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub asset: AssetId,
    pub lat: f64,
    pub lon: f64,
}

impl SensorReport {
    pub fn new(asset: impl Into<AssetId>, lat: f64, lon: f64) -> Self {
        Self {
            asset: asset.into(),
            lat,
            lon,
        }
    }

    #[inline]
    pub fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    /// Projects to a planar sensor.
    pub fn project(&self, geodesy: &dyn Geodesy) -> Sensor {
        Sensor::new(self.asset.clone(), geodesy.project(self.location()))
    }

    fn validate(&self, id: ObservationId) -> Result<(), ObservationError> {
        if self.asset.trim().is_empty() {
            return Err(ObservationError::MissingAsset { id });
        }
        if !self.lat.is_finite() || self.lat.abs() > 90.0 {
            return Err(ObservationError::InvalidLatitude {
                id,
                asset: self.asset.clone(),
                lat: self.lat,
            });
        }
        if !self.lon.is_finite() || self.lon.abs() > 180.0 {
            return Err(ObservationError::InvalidLongitude {
                id,
                asset: self.asset.clone(),
                lon: self.lon,
            });
        }
        Ok(())
    }
}

/// An observation as submitted for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationReport {
    pub id: ObservationId,
    pub kind: ObservationKind,
    pub sensor: SensorReport,
    #[serde(default)]
    pub paired: Option<SensorReport>,
    pub value: f64,
    /// Falls back to the mission's per-kind default when absent.
    #[serde(default)]
    pub variance: Option<f64>,
}

impl ObservationReport {
    /// A range observation in metres.
    pub fn range(id: ObservationId, sensor: SensorReport, metres: f64) -> Self {
        Self {
            id,
            kind: ObservationKind::Range,
            sensor,
            paired: None,
            value: metres,
            variance: None,
        }
    }

    /// A TDOA observation: arrival at `sensor` minus arrival at `paired`, seconds.
    pub fn tdoa(id: ObservationId, sensor: SensorReport, paired: SensorReport, seconds: f64) -> Self {
        Self {
            id,
            kind: ObservationKind::Tdoa,
            sensor,
            paired: Some(paired),
            value: seconds,
            variance: None,
        }
    }

    /// An AOA observation in radians, counter-clockwise from east.
    pub fn aoa(id: ObservationId, sensor: SensorReport, radians: f64) -> Self {
        Self {
            id,
            kind: ObservationKind::Aoa,
            sensor,
            paired: None,
            value: radians,
            variance: None,
        }
    }

    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = Some(variance);
        self
    }

    /// Checks ranges and required fields.
    pub fn validate(&self) -> Result<(), ObservationError> {
        let id = self.id;
        self.sensor.validate(id)?;

        if !self.value.is_finite() {
            return Err(ObservationError::NonFiniteValue { id });
        }
        if let Some(variance) = self.variance {
            if !variance.is_finite() || variance < 0.0 {
                return Err(ObservationError::InvalidVariance { id, variance });
            }
        }

        match self.kind {
            ObservationKind::Range => {
                if self.value <= 0.0 {
                    return Err(ObservationError::NonPositiveRange {
                        id,
                        value: self.value,
                    });
                }
            }
            ObservationKind::Tdoa => {
                let paired = self
                    .paired
                    .as_ref()
                    .ok_or(ObservationError::MissingPairedSensor { id })?;
                paired.validate(id)?;
            }
            ObservationKind::Aoa => {
                if !(0.0..=TAU).contains(&self.value) {
                    return Err(ObservationError::BearingOutOfRange {
                        id,
                        value: self.value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Projects the report onto the plane.
    ///
    /// The caller supplies the resolved variance; validation must already have passed.
    pub fn to_observation(
        &self,
        geodesy: &dyn Geodesy,
        variance: f64,
    ) -> Result<Observation, ObservationError> {
        let sensor = self.sensor.project(geodesy);
        let geometry = match self.kind {
            ObservationKind::Range => ObservationGeometry::Range { sensor },
            ObservationKind::Aoa => ObservationGeometry::Aoa { sensor },
            ObservationKind::Tdoa => {
                let paired = self
                    .paired
                    .as_ref()
                    .ok_or(ObservationError::MissingPairedSensor { id: self.id })?;
                ObservationGeometry::Tdoa {
                    sensor,
                    paired: paired.project(geodesy),
                }
            }
        };

        Ok(Observation {
            id: self.id,
            geometry,
            value: self.value,
            variance,
            previous_value: None,
            display: None,
        })
    }

    /// All sensor reports, primary first.
    pub fn sensors(&self) -> impl Iterator<Item = &SensorReport> {
        core::iter::once(&self.sensor).chain(self.paired.as_ref())
    }
}
