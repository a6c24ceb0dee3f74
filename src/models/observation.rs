//! Observation (sensor) models
//!
//! Linearizes Range, TDOA and AOA observations about a planar state. Every
//! model yields the predicted value `f_est`, the 1x2 Jacobian `H`, and the
//! measured value `d` converted into the same units as `f_est`:
//!
//! | Kind  | `f_est` / `d` units | `d` from raw value |
//! |-------|---------------------|--------------------|
//! | Range | metres              | as given           |
//! | TDOA  | metres              | seconds × c        |
//! | AOA   | degrees in [0, 360) | radians × 180/π    |

use crate::types::observation::{Observation, ObservationGeometry};
use crate::types::spaces::{ComputeInnovation, Innovation, Measurement, PlanarState};
use crate::types::transforms::PlanarJacobian;

/// Propagation speed used to convert TDOA seconds to metres.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Sensor-to-state distances below this leave the Jacobian undefined.
pub const MIN_SEPARATION: f64 = 1e-9;

// ============================================================================
// Linearization
// ============================================================================

/// An observation linearized about a state estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linearization {
    /// Model prediction `f_est`.
    pub predicted: Measurement<f64, 1>,
    /// Measured value `d`, in the prediction's units.
    pub measured: Measurement<f64, 1>,
    /// Jacobian row `H`.
    pub jacobian: PlanarJacobian,
}

impl Linearization {
    /// Plain `d - f_est`, no bearing wrap handling.
    #[inline]
    pub fn raw_innovation(&self) -> Innovation<f64, 1> {
        self.measured.innovation(self.predicted)
    }
}

/// Distance between a sensor position and the state.
#[inline]
pub fn range_between(sensor: &PlanarState, state: &PlanarState) -> f64 {
    (*sensor - *state).norm()
}

/// Bearing from `sensor` to `state` in degrees, counter-clockwise from east, in `[0, 360)`.
///
/// A state due north of the sensor is 90°, due south 270°.
pub fn bearing_degrees(sensor: &PlanarState, state: &PlanarState) -> f64 {
    let dx = state.easting() - sensor.easting();
    let dy = state.northing() - sensor.northing();

    let degrees = dy.atan2(dx).to_degrees();
    if degrees < 0.0 {
        let wrapped = degrees + 360.0;
        // -1e-15 + 360 rounds to 360
        if wrapped >= 360.0 {
            0.0
        } else {
            wrapped
        }
    } else {
        degrees
    }
}

/// Measured value `d` in the units of the model prediction.
pub fn measured_value(observation: &Observation) -> f64 {
    match observation.geometry {
        ObservationGeometry::Range { .. } => observation.value,
        ObservationGeometry::Tdoa { .. } => observation.value * SPEED_OF_LIGHT,
        ObservationGeometry::Aoa { .. } => observation.value.to_degrees(),
    }
}

/// Returns `(R, [dR/de, dR/dn])` or `None` when the state sits on the sensor.
fn range_partials(sensor: &PlanarState, state: &PlanarState) -> Option<(f64, [f64; 2])> {
    let r = range_between(sensor, state);
    if r.is_nan() || r <= MIN_SEPARATION {
        return None;
    }
    let d_e = -(sensor.easting() - state.easting()) / r;
    let d_n = -(sensor.northing() - state.northing()) / r;
    Some((r, [d_e, d_n]))
}

/// Linearizes `observation` about `state`.
///
/// Returns `None` when the Jacobian is undefined, which happens when the
/// state coincides with any sensor the observation references.
pub fn linearize(observation: &Observation, state: &PlanarState) -> Option<Linearization> {
    let (predicted, h) = match &observation.geometry {
        ObservationGeometry::Range { sensor } => range_partials(&sensor.position, state)?,
        ObservationGeometry::Tdoa { sensor, paired } => {
            let (ra, ha) = range_partials(&sensor.position, state)?;
            let (rb, hb) = range_partials(&paired.position, state)?;
            (ra - rb, [ha[0] - hb[0], ha[1] - hb[1]])
        }
        ObservationGeometry::Aoa { sensor } => {
            let s = &sensor.position;
            let r = range_between(s, state);
            if r.is_nan() || r <= MIN_SEPARATION {
                return None;
            }
            // Scaled by R rather than R^2; the filter gain absorbs the factor.
            let h = [
                (s.northing() - state.northing()) / r,
                -(s.easting() - state.easting()) / r,
            ];
            (bearing_degrees(s, state), h)
        }
    };

    let linearization = Linearization {
        predicted: Measurement::scalar(predicted),
        measured: Measurement::scalar(measured_value(observation)),
        jacobian: PlanarJacobian::row(h[0], h[1]),
    };
    (predicted.is_finite() && linearization.jacobian.is_finite()).then_some(linearization)
}

// ============================================================================
// Bearing Wraparound
// ============================================================================

/// Signed shortest turn from bearing `from` to bearing `to`, degrees in `[-180, 180)`.
#[inline]
pub fn shortest_turn(from: f64, to: f64) -> f64 {
    (to - from + 540.0).rem_euclid(360.0) - 180.0
}

/// Innovation for a bearing observation, in degrees.
///
/// When `d - f_est` exceeds 180° in magnitude the measured and predicted
/// bearings straddle the 0°/360° boundary. If a directional reference is
/// available (the bearing from the sensor to the state implied by the
/// non-AOA corrections of the current iteration) the innovation is taken the
/// short way round, signed toward that reference. Without a reference the raw
/// difference is kept.
pub fn bearing_innovation(measured: f64, predicted: f64, reference_bearing: Option<f64>) -> f64 {
    let raw = measured - predicted;
    if raw.abs() <= 180.0 {
        return raw;
    }
    let Some(reference) = reference_bearing else {
        return raw;
    };

    let magnitude = 360.0 - raw.abs();
    let toward = shortest_turn(predicted, reference);
    let sign = if toward.abs() > f64::EPSILON {
        toward.signum()
    } else {
        -raw.signum()
    };
    sign * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::observation::Sensor;

    fn observation(geometry: ObservationGeometry, value: f64) -> Observation {
        Observation {
            id: 1,
            geometry,
            value,
            variance: 1.0,
            previous_value: None,
            display: None,
        }
    }

    fn finite_difference(obs: &Observation, state: &PlanarState) -> [f64; 2] {
        let eps = 1e-4;
        let f = |s: &PlanarState| linearize(obs, s).unwrap().predicted.value();
        let de = (f(&PlanarState::planar(state.easting() + eps, state.northing()))
            - f(&PlanarState::planar(state.easting() - eps, state.northing())))
            / (2.0 * eps);
        let dn = (f(&PlanarState::planar(state.easting(), state.northing() + eps))
            - f(&PlanarState::planar(state.easting(), state.northing() - eps)))
            / (2.0 * eps);
        [de, dn]
    }

    #[test]
    fn test_range_prediction_is_euclidean() {
        let sensor = Sensor::new("a", PlanarState::planar(100.0, 200.0));
        let obs = observation(ObservationGeometry::Range { sensor }, 10.0);
        let state = PlanarState::planar(130.0, 240.0);

        let lin = linearize(&obs, &state).unwrap();
        assert!((lin.predicted.value() - 50.0).abs() < 1e-12);
        assert!((lin.measured.value() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_range_jacobian_matches_finite_difference() {
        let sensor = Sensor::new("a", PlanarState::planar(-350.0, 75.0));
        let obs = observation(ObservationGeometry::Range { sensor }, 10.0);

        for state in [
            PlanarState::planar(10.0, 20.0),
            PlanarState::planar(-900.0, -400.0),
            PlanarState::planar(-350.0, 1000.0),
        ] {
            let lin = linearize(&obs, &state).unwrap();
            let fd = finite_difference(&obs, &state);
            let h = lin.jacobian.as_matrix();
            assert!((h[(0, 0)] - fd[0]).abs() < 1e-6, "d/de {} vs {}", h[(0, 0)], fd[0]);
            assert!((h[(0, 1)] - fd[1]).abs() < 1e-6, "d/dn {} vs {}", h[(0, 1)], fd[1]);
        }
    }

    #[test]
    fn test_tdoa_jacobian_matches_finite_difference() {
        let obs = observation(
            ObservationGeometry::Tdoa {
                sensor: Sensor::new("a", PlanarState::planar(0.0, 0.0)),
                paired: Sensor::new("b", PlanarState::planar(2000.0, 0.0)),
            },
            1.0e-6,
        );
        let state = PlanarState::planar(700.0, 900.0);

        let lin = linearize(&obs, &state).unwrap();
        let fd = finite_difference(&obs, &state);
        let h = lin.jacobian.as_matrix();
        assert!((h[(0, 0)] - fd[0]).abs() < 1e-6);
        assert!((h[(0, 1)] - fd[1]).abs() < 1e-6);

        // seconds -> metres
        assert!((lin.measured.value() - 299.792458).abs() < 1e-9);
    }

    #[test]
    fn test_undefined_at_sensor() {
        let sensor = Sensor::new("a", PlanarState::planar(5.0, 5.0));
        let obs = observation(ObservationGeometry::Range { sensor: sensor.clone() }, 1.0);
        assert!(linearize(&obs, &PlanarState::planar(5.0, 5.0)).is_none());

        let aoa = observation(ObservationGeometry::Aoa { sensor }, 1.0);
        assert!(linearize(&aoa, &PlanarState::planar(5.0, 5.0)).is_none());
    }

    #[test]
    fn test_bearing_quadrants() {
        let s = PlanarState::planar(0.0, 0.0);
        let cases = [
            ((1.0, 1.0), 45.0),
            ((-1.0, 1.0), 135.0),
            ((-1.0, -1.0), 225.0),
            ((1.0, -1.0), 315.0),
            ((1.0, 0.0), 0.0),
            ((0.0, 1.0), 90.0),
            ((-1.0, 0.0), 180.0),
            ((0.0, -1.0), 270.0),
        ];
        for ((e, n), expected) in cases {
            let b = bearing_degrees(&s, &PlanarState::planar(e, n));
            assert!((b - expected).abs() < 1e-9, "({e}, {n}) -> {b}, expected {expected}");
        }
    }

    #[test]
    fn test_bearing_continuous_across_cardinal_axes() {
        let s = PlanarState::planar(100.0, -50.0);
        let radius = 500.0;
        let mut previous = bearing_degrees(&s, &PlanarState::planar(100.0 + radius, -50.0));

        // Sweep counter-clockwise; only the 360 -> 0 wrap may jump.
        let steps = 3600;
        for i in 1..steps {
            let theta = (i as f64 / steps as f64) * std::f64::consts::TAU;
            let state = PlanarState::planar(100.0 + radius * theta.cos(), -50.0 + radius * theta.sin());
            let b = bearing_degrees(&s, &state);
            assert!((0.0..360.0).contains(&b));
            assert!((b - previous).abs() < 0.2, "jump from {previous} to {b} at step {i}");
            previous = b;
        }
    }

    #[test]
    fn test_aoa_jacobian_points_toward_increasing_bearing() {
        let sensor = Sensor::new("a", PlanarState::planar(0.0, 0.0));
        let obs = observation(ObservationGeometry::Aoa { sensor }, 0.5);

        for state in [
            PlanarState::planar(300.0, 200.0),
            PlanarState::planar(-300.0, 200.0),
            PlanarState::planar(-300.0, -200.0),
            PlanarState::planar(300.0, -200.0),
        ] {
            let lin = linearize(&obs, &state).unwrap();
            let fd = finite_difference(&obs, &state);
            let h = lin.jacobian.as_matrix();

            let dot = h[(0, 0)] * fd[0] + h[(0, 1)] * fd[1];
            assert!(dot > 0.0);
            // Unit-length row
            assert!(((h[(0, 0)].powi(2) + h[(0, 1)].powi(2)).sqrt() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_aoa_measured_in_degrees() {
        let sensor = Sensor::new("a", PlanarState::planar(0.0, 0.0));
        let obs = observation(ObservationGeometry::Aoa { sensor }, std::f64::consts::FRAC_PI_2);
        let lin = linearize(&obs, &PlanarState::planar(0.0, 10.0)).unwrap();

        assert!((lin.measured.value() - 90.0).abs() < 1e-12);
        assert!((lin.predicted.value() - 90.0).abs() < 1e-12);
        assert!(lin.raw_innovation().value().abs() < 1e-12);
    }

    #[test]
    fn test_shortest_turn() {
        assert!((shortest_turn(350.0, 10.0) - 20.0).abs() < 1e-12);
        assert!((shortest_turn(10.0, 350.0) + 20.0).abs() < 1e-12);
        assert!((shortest_turn(90.0, 45.0) + 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_bearing_innovation_without_wrap_is_raw() {
        assert!((bearing_innovation(40.0, 30.0, Some(200.0)) - 10.0).abs() < 1e-12);
        assert!((bearing_innovation(30.0, 40.0, None) + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_bearing_innovation_across_wrap() {
        // Measured 5°, predicted 355°: raw is -350.
        let raw = bearing_innovation(5.0, 355.0, None);
        assert!((raw + 350.0).abs() < 1e-12);

        // Reference lies counter-clockwise of the prediction: go +10.
        let toward = bearing_innovation(5.0, 355.0, Some(2.0));
        assert!((toward - 10.0).abs() < 1e-12);

        // Reference lies clockwise: magnitude kept, sign follows reference.
        let away = bearing_innovation(5.0, 355.0, Some(340.0));
        assert!((away + 10.0).abs() < 1e-12);

        // Reference equal to prediction falls back to the short way.
        let same = bearing_innovation(5.0, 355.0, Some(355.0));
        assert!((same - 10.0).abs() < 1e-12);
    }
}
