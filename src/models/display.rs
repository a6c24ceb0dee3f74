//! Plottable measurement geometry
//!
//! Ranges render as circles around the sensor, TDOA as one branch of the
//! hyperbola with the two sensors as foci, and AOA as a ray from the sensor.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::models::geodesy::{Geodesy, Zone};
use crate::models::observation::measured_value;
use crate::types::observation::{Observation, ObservationGeometry};
use crate::types::results::LatLon;
use crate::types::spaces::PlanarState;

/// Angular step of range circles, radians.
const CIRCLE_STEP: f64 = 0.2;
/// Hyperbola parameter range and step.
const HYPERBOLA_EXTENT: f64 = 2.0;
const HYPERBOLA_STEP: f64 = 0.1;
/// Length and sample spacing of bearing rays, metres.
const RAY_LENGTH: f64 = 5000.0;
const RAY_STEP: f64 = 100.0;

/// Geographic polyline for displaying one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "points", rename_all = "snake_case")]
pub enum DisplayGeometry {
    Circle(Vec<LatLon>),
    Hyperbola(Vec<LatLon>),
    Line(Vec<LatLon>),
}

impl DisplayGeometry {
    pub fn points(&self) -> &[LatLon] {
        match self {
            DisplayGeometry::Circle(p) | DisplayGeometry::Hyperbola(p) | DisplayGeometry::Line(p) => p,
        }
    }

    /// Computes the geometry of an observation and projects it into `zone`.
    pub fn for_observation(observation: &Observation, geodesy: &dyn Geodesy, zone: Zone) -> Self {
        let to_latlon = |points: Vec<PlanarState>| -> Vec<LatLon> {
            points.iter().map(|p| geodesy.unproject(p, zone)).collect()
        };

        match &observation.geometry {
            ObservationGeometry::Range { sensor } => {
                DisplayGeometry::Circle(to_latlon(circle(&sensor.position, observation.value)))
            }
            ObservationGeometry::Tdoa { sensor, paired } => DisplayGeometry::Hyperbola(to_latlon(
                hyperbola(&sensor.position, &paired.position, measured_value(observation)),
            )),
            ObservationGeometry::Aoa { sensor } => {
                DisplayGeometry::Line(to_latlon(ray(&sensor.position, observation.value)))
            }
        }
    }
}

/// Circle of `radius` around `centre`, closed.
pub fn circle(centre: &PlanarState, radius: f64) -> Vec<PlanarState> {
    let steps = (TAU / CIRCLE_STEP).ceil() as usize;
    (0..=steps)
        .map(|i| {
            let theta = (i as f64 * CIRCLE_STEP).min(TAU);
            PlanarState::planar(
                centre.easting() + radius * theta.cos(),
                centre.northing() + radius * theta.sin(),
            )
        })
        .collect()
}

/// Hyperbola branch whose points lie `range_difference` metres closer to `b` than `a`.
///
/// The branch is parameterized as `(a·cosh t, b·sinh t)` in the frame centred
/// between the foci with the x axis pointing from `a` to `b`.
pub fn hyperbola(a: &PlanarState, b: &PlanarState, range_difference: f64) -> Vec<PlanarState> {
    let focal = (*b - *a).norm() / 2.0;
    if focal <= 0.0 {
        return Vec::new();
    }
    let semi_major = range_difference / 2.0;
    let semi_minor = (focal * focal - semi_major * semi_major).abs().sqrt();
    let cos_rot = (b.easting() - a.easting()) / (2.0 * focal);
    let sin_rot = (b.northing() - a.northing()) / (2.0 * focal);
    let mid_e = (a.easting() + b.easting()) / 2.0;
    let mid_n = (a.northing() + b.northing()) / 2.0;

    let steps = (2.0 * HYPERBOLA_EXTENT / HYPERBOLA_STEP).round() as i64;
    (0..=steps)
        .map(|i| {
            let t = -HYPERBOLA_EXTENT + i as f64 * HYPERBOLA_STEP;
            let x = semi_major * t.cosh();
            let y = semi_minor * t.sinh();
            PlanarState::planar(mid_e + x * cos_rot - y * sin_rot, mid_n + x * sin_rot + y * cos_rot)
        })
        .collect()
}

/// Ray from `origin` along `bearing` (radians counter-clockwise from east).
pub fn ray(origin: &PlanarState, bearing: f64) -> Vec<PlanarState> {
    let steps = (RAY_LENGTH / RAY_STEP).round() as usize;
    let (sin, cos) = bearing.sin_cos();
    (0..=steps)
        .map(|i| {
            let d = i as f64 * RAY_STEP;
            PlanarState::planar(origin.easting() + d * cos, origin.northing() + d * sin)
        })
        .collect()
}
