//! Estimation outputs handed to result listeners

use serde::{Deserialize, Serialize};

use crate::types::observation::{ObservationId, ObservationKind};
use crate::types::spaces::PlanarState;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Confidence ellipse around an estimate.
///
/// Axes are in metres; `rotation` is the angle of the major axis from the
/// easting axis, radians in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceEllipse {
    pub semi_major: f64,
    pub semi_minor: f64,
    pub rotation: f64,
}

/// Predicted versus measured value for one observation at the latest iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationDiagnostic {
    pub id: ObservationId,
    pub kind: ObservationKind,
    /// Model prediction at the linearization point (metres or degrees).
    pub predicted: f64,
    /// Measurement converted to the prediction's units.
    pub measured: f64,
    /// Innovation actually applied, after any bearing wrap handling.
    pub innovation: f64,
    /// State correction contributed by this observation.
    pub correction: PlanarState,
}

/// A single summarized estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeolocationResult {
    pub position: LatLon,
    /// `[easting, northing]` in metres.
    pub planar: [f64; 2],
    pub ellipse: ConfidenceEllipse,
    /// `|Δe| + |Δn|` of the last iteration.
    pub state_residual: f64,
    /// Mean scaled measurement misfit across contributing observations.
    pub measurement_residual: f64,
    pub iterations: u64,
    pub converged: bool,
    /// Observations that contributed to the last iteration.
    pub observations: Vec<ObservationId>,
    /// Label of the initial state this estimate started from.
    pub seed: String,
}

/// What a listener receives: a best estimate plus ranked alternates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResults {
    pub mission_id: String,
    pub best: GeolocationResult,
    pub alternates: Vec<GeolocationResult>,
}

impl ComputeResults {
    /// Ranks candidates by measurement residual, ascending.
    ///
    /// Returns `None` for an empty candidate list.
    pub fn ranked(mission_id: impl Into<String>, mut candidates: Vec<GeolocationResult>) -> Option<Self> {
        candidates.sort_by(|a, b| a.measurement_residual.total_cmp(&b.measurement_residual));
        let mut iter = candidates.into_iter();
        let best = iter.next()?;
        Some(Self {
            mission_id: mission_id.into(),
            best,
            alternates: iter.collect(),
        })
    }

    /// Number of estimates carried, best included.
    #[inline]
    pub fn count(&self) -> usize {
        1 + self.alternates.len()
    }

    /// Best estimate followed by alternates.
    pub fn iter(&self) -> impl Iterator<Item = &GeolocationResult> {
        core::iter::once(&self.best).chain(self.alternates.iter())
    }
}
