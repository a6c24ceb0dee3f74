//! Fused Extended Kalman Filter for static-target geolocation
//!
//! Each iteration predicts with an identity transition and inflates the
//! covariance by the process noise, then fuses every observation against the
//! *same* predicted state:
//!
//! ```text
//! X' = X                 P' = P + Q
//! for each observation i:
//!     S_i  = H_i P' H_iᵀ + R_i
//!     K_i  = P' H_iᵀ S_i⁻¹
//!     ΔX  += K_i r_i     ΔP += K_i H_i P'
//! X = X' + ΔX            P = P' − ΔP
//! ```
//!
//! The corrections are summed and applied once, rather than sequentially.
//! Repeating the iteration on a fixed observation set drives the state toward
//! the point where the weighted residuals balance.
//!
//! # Type Safety
//!
//! [`EkfState`] carries a phase marker so an update can only consume a
//! predicted state, and a prediction only an updated one.

use core::marker::PhantomData;

use nalgebra::RealField;

use crate::models::observation::{bearing_degrees, bearing_innovation, linearize};
use crate::types::observation::{Observation, ObservationId, ObservationKind};
use crate::types::phase::{Predicted, UpdateStats, Updated};
use crate::types::results::ObservationDiagnostic;
use crate::types::spaces::{
    MeasurementCovariance, PlanarCovariance, PlanarState, StateCovariance, StateVector,
};
use crate::types::transforms::{
    compute_innovation_covariance, compute_kalman_gain, covariance_reduction, innovation_of,
};

// ============================================================================
// Filter State
// ============================================================================

/// State estimate for the EKF, tagged with its filter phase.
#[derive(Debug, Clone, PartialEq)]
pub struct EkfState<T: RealField, const N: usize, Phase = Updated> {
    /// State estimate mean
    pub mean: StateVector<T, N>,
    /// State estimate covariance
    pub covariance: StateCovariance<T, N>,
    _phase: PhantomData<Phase>,
}

impl<T: RealField + Copy, const N: usize> EkfState<T, N, Updated> {
    /// Creates an updated-phase state.
    #[inline]
    pub fn new(mean: StateVector<T, N>, covariance: StateCovariance<T, N>) -> Self {
        Self {
            mean,
            covariance,
            _phase: PhantomData,
        }
    }
}

impl<T: RealField + Copy, const N: usize, Phase> EkfState<T, N, Phase> {
    /// Returns the trace of the covariance matrix (sum of variances).
    #[inline]
    pub fn uncertainty(&self) -> T {
        self.covariance.trace()
    }

    #[inline]
    fn with_phase<P>(mean: StateVector<T, N>, covariance: StateCovariance<T, N>) -> EkfState<T, N, P> {
        EkfState {
            mean,
            covariance,
            _phase: PhantomData,
        }
    }
}

/// Result of one fused update.
#[derive(Debug, Clone)]
pub struct FusedUpdate {
    pub state: EkfState<f64, 2, Updated>,
    /// Summed correction `ΔX` applied to the predicted mean.
    pub correction: PlanarState,
    pub diagnostics: Vec<ObservationDiagnostic>,
    pub stats: UpdateStats,
}

// ============================================================================
// Fused EKF
// ============================================================================

/// EKF with identity dynamics and joint-then-apply observation fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEkf {
    /// Process noise Q added to the covariance every prediction.
    pub process_noise: PlanarCovariance,
}

impl FusedEkf {
    #[inline]
    pub fn new(process_noise: PlanarCovariance) -> Self {
        Self { process_noise }
    }

    /// Prediction for a static target: `X' = X`, `P' = P + Q`.
    pub fn predict(&self, state: &EkfState<f64, 2, Updated>) -> EkfState<f64, 2, Predicted> {
        EkfState::<f64, 2, Updated>::with_phase(state.mean, state.covariance.add(&self.process_noise))
    }

    /// Fuses `observations` against the predicted state.
    ///
    /// Observations must be ordered with every AOA after every non-AOA one;
    /// the first bearing captures the non-AOA correction accumulated so far
    /// as a directional reference for wraparound handling. Observations that
    /// cannot be linearized, or whose innovation covariance is singular, are
    /// skipped and counted.
    pub fn update(
        &self,
        predicted: &EkfState<f64, 2, Predicted>,
        observations: &[Observation],
    ) -> FusedUpdate {
        debug_assert!(
            observations.windows(2).all(|w| w[0].kind() <= w[1].kind()),
            "observations must be sorted by kind"
        );

        let p = &predicted.covariance;
        let mut correction = PlanarState::zeros();
        let mut reduction = PlanarCovariance::zeros();
        let mut diagnostics = Vec::with_capacity(observations.len());
        let mut stats = UpdateStats::default();

        // Captured once, at the first AOA observation
        let mut reference: Option<Option<PlanarState>> = None;

        for obs in observations {
            let Some(lin) = linearize(obs, &predicted.mean) else {
                tracing::trace!(observation = obs.id, kind = %obs.kind(), "jacobian undefined, skipping observation");
                stats.undefined_jacobian_count += 1;
                continue;
            };

            let r = MeasurementCovariance::from_matrix(nalgebra::matrix![obs.variance]);
            let s = compute_innovation_covariance(p, &lin.jacobian, &r);
            let Some(gain) = compute_kalman_gain(p, &lin.jacobian, &s) else {
                tracing::trace!(observation = obs.id, kind = %obs.kind(), "singular innovation covariance, skipping observation");
                stats.singular_covariance_count += 1;
                continue;
            };

            let innovation = match obs.kind() {
                ObservationKind::Aoa => {
                    let reference_state = *reference.get_or_insert_with(|| {
                        correction
                            .is_nonzero()
                            .then(|| predicted.mean + correction)
                    });
                    let sensor = &obs.geometry.sensor().position;
                    let reference_bearing = reference_state.map(|s| bearing_degrees(sensor, &s));
                    innovation_of(bearing_innovation(
                        lin.measured.value(),
                        lin.predicted.value(),
                        reference_bearing,
                    ))
                }
                ObservationKind::Range | ObservationKind::Tdoa => lin.raw_innovation(),
            };

            let delta = gain.correct(&innovation);
            correction = correction + delta;
            reduction = reduction.add(&covariance_reduction(p, &gain, &lin.jacobian));
            stats.applied += 1;

            tracing::trace!(
                observation = obs.id,
                kind = %obs.kind(),
                f_est = lin.predicted.value(),
                d = lin.measured.value(),
                innovation = innovation.value(),
                "fused observation"
            );

            diagnostics.push(ObservationDiagnostic {
                id: obs.id,
                kind: obs.kind(),
                predicted: lin.predicted.value(),
                measured: lin.measured.value(),
                innovation: innovation.value(),
                correction: delta,
            });
        }

        let mean = predicted.mean + correction;
        let covariance = p.subtract(&reduction);

        if mean.is_finite() && covariance.is_finite() {
            FusedUpdate {
                state: EkfState::new(mean, covariance),
                correction,
                diagnostics,
                stats,
            }
        } else {
            tracing::trace!("fused update produced non-finite state, keeping prediction");
            stats.non_finite_count += 1;
            FusedUpdate {
                state: EkfState::new(predicted.mean, predicted.covariance),
                correction: PlanarState::zeros(),
                diagnostics: Vec::new(),
                stats,
            }
        }
    }

    /// Runs one predict/update iteration on `execution`, returning the state residual.
    pub fn iterate(&self, execution: &mut FilterExecution, observations: &[Observation]) -> f64 {
        let predicted = self.predict(&execution.state);
        let update = self.update(&predicted, observations);
        execution.apply(update);
        execution.residual()
    }
}

// ============================================================================
// Filter Execution
// ============================================================================

/// One independent filter run from a single initial state.
#[derive(Debug, Clone)]
pub struct FilterExecution {
    seed: String,
    state: EkfState<f64, 2, Updated>,
    diagnostics: Vec<ObservationDiagnostic>,
    last_correction: PlanarState,
    last_stats: UpdateStats,
    stats: UpdateStats,
    iterations: u64,
}

impl FilterExecution {
    /// Starts an execution at `mean` with covariance `covariance_scale · I`.
    pub fn new(seed: impl Into<String>, mean: PlanarState, covariance_scale: f64) -> Self {
        Self {
            seed: seed.into(),
            state: EkfState::new(mean, StateCovariance::scaled_identity(covariance_scale)),
            diagnostics: Vec::new(),
            last_correction: PlanarState::zeros(),
            last_stats: UpdateStats::default(),
            stats: UpdateStats::default(),
            iterations: 0,
        }
    }

    fn apply(&mut self, update: FusedUpdate) {
        self.state = update.state;
        self.last_correction = update.correction;
        self.diagnostics = update.diagnostics;
        self.stats.accumulate(&update.stats);
        self.last_stats = update.stats;
        self.iterations += 1;
    }

    #[inline]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    #[inline]
    pub fn state(&self) -> &EkfState<f64, 2, Updated> {
        &self.state
    }

    /// Per-observation diagnostics from the latest iteration.
    #[inline]
    pub fn diagnostics(&self) -> &[ObservationDiagnostic] {
        &self.diagnostics
    }

    /// `|Δe| + |Δn|` of the latest iteration.
    #[inline]
    pub fn residual(&self) -> f64 {
        self.last_correction.abs_sum()
    }

    #[inline]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Counts accumulated over every iteration.
    #[inline]
    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    /// Whether the latest iteration used at least one observation and moved
    /// the state by less than `threshold`.
    pub fn is_settled(&self, threshold: f64) -> bool {
        self.iterations > 0 && self.last_stats.applied > 0 && self.residual() < threshold
    }

    /// Observations that contributed to the latest iteration.
    pub fn contributing(&self) -> Vec<ObservationId> {
        self.diagnostics.iter().map(|d| d.id).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::observation::SPEED_OF_LIGHT;
    use crate::types::observation::{ObservationGeometry, Sensor};

    fn sensor(name: &str, e: f64, n: f64) -> Sensor {
        Sensor::new(name, PlanarState::planar(e, n))
    }

    fn obs(id: ObservationId, geometry: ObservationGeometry, value: f64) -> Observation {
        Observation {
            id,
            geometry,
            value,
            variance: 1.0,
            previous_value: None,
            display: None,
        }
    }

    fn filter() -> FusedEkf {
        FusedEkf::new(StateCovariance::scaled_identity(0.1))
    }

    #[test]
    fn test_ekf_state_creation() {
        let state = EkfState::new(
            PlanarState::planar(1.0, 2.0),
            StateCovariance::<f64, 2>::scaled_identity(0.01),
        );
        assert!((state.uncertainty() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_predict_inflates_covariance_only() {
        let state = EkfState::new(PlanarState::planar(10.0, 20.0), StateCovariance::scaled_identity(0.01));
        let predicted = filter().predict(&state);

        assert_eq!(predicted.mean, state.mean);
        assert!((predicted.uncertainty() - 0.22).abs() < 1e-12);
    }

    #[test]
    fn test_single_range_update() {
        let observations = vec![obs(1, ObservationGeometry::Range { sensor: sensor("a", 0.0, 0.0) }, 100.0)];
        let state = EkfState::new(PlanarState::planar(90.0, 0.0), StateCovariance::scaled_identity(0.9));

        let predicted = filter().predict(&state);
        let update = filter().update(&predicted, &observations);

        // P' = I, H = [1, 0], S = 2, K = [0.5, 0], r = 10
        assert!((update.correction.easting() - 5.0).abs() < 1e-12);
        assert!(update.correction.northing().abs() < 1e-12);
        assert!((update.state.mean.easting() - 95.0).abs() < 1e-12);
        assert!((update.state.covariance.as_matrix()[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((update.state.covariance.as_matrix()[(1, 1)] - 1.0).abs() < 1e-12);
        assert_eq!(update.stats.applied, 1);
        assert_eq!(update.diagnostics.len(), 1);
    }

    #[test]
    fn test_fused_corrections_use_same_prediction() {
        // Two identical ranges: fused update doubles the single correction.
        let a = sensor("a", 0.0, 0.0);
        let observations = vec![
            obs(1, ObservationGeometry::Range { sensor: a.clone() }, 100.0),
            obs(2, ObservationGeometry::Range { sensor: a }, 100.0),
        ];
        let state = EkfState::new(PlanarState::planar(90.0, 0.0), StateCovariance::scaled_identity(0.9));

        let predicted = filter().predict(&state);
        let update = filter().update(&predicted, &observations);

        assert!((update.correction.easting() - 10.0).abs() < 1e-12);
        // P' - 2 * 0.5
        assert!(update.state.covariance.as_matrix()[(0, 0)].abs() < 1e-12);
    }

    #[test]
    fn test_observation_at_state_is_skipped() {
        let observations = vec![
            obs(1, ObservationGeometry::Range { sensor: sensor("a", 50.0, 50.0) }, 10.0),
            obs(2, ObservationGeometry::Range { sensor: sensor("b", 0.0, 0.0) }, 70.0),
        ];
        let state = EkfState::new(PlanarState::planar(50.0, 50.0), StateCovariance::scaled_identity(0.01));

        let predicted = filter().predict(&state);
        let update = filter().update(&predicted, &observations);

        assert_eq!(update.stats.undefined_jacobian_count, 1);
        assert_eq!(update.stats.applied, 1);
        assert_eq!(update.diagnostics[0].id, 2);
    }

    #[test]
    fn test_singular_innovation_is_skipped() {
        let mut zero_noise = obs(1, ObservationGeometry::Range { sensor: sensor("a", 0.0, 0.0) }, 10.0);
        zero_noise.variance = 0.0;
        let ekf = FusedEkf::new(StateCovariance::zeros());
        let state = EkfState::new(PlanarState::planar(5.0, 0.0), StateCovariance::zeros());

        let update = ekf.update(&ekf.predict(&state), &[zero_noise]);
        assert_eq!(update.stats.singular_covariance_count, 1);
        assert!(!update.correction.is_nonzero());
    }

    #[test]
    fn test_skips_accumulate_across_iterations() {
        let observations = vec![obs(1, ObservationGeometry::Range { sensor: sensor("a", 0.0, 0.0) }, 10.0)];
        let ekf = filter();
        let mut execution = FilterExecution::new("on-sensor", PlanarState::planar(0.0, 0.0), 0.01);
        for _ in 0..25 {
            ekf.iterate(&mut execution, &observations);
        }

        assert_eq!(execution.iterations(), 25);
        assert_eq!(execution.stats().undefined_jacobian_count, 25);
        assert_eq!(execution.stats().applied, 0);
        assert!(execution.diagnostics().is_empty());
    }

    #[test]
    fn test_trilateration_converges() {
        let target = PlanarState::planar(400.0, 300.0);
        let sensors = [sensor("a", 0.0, 0.0), sensor("b", 1000.0, 0.0), sensor("c", 0.0, 1000.0)];
        let observations: Vec<_> = sensors
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let r = (s.position - target).norm();
                obs(i as u64, ObservationGeometry::Range { sensor: s.clone() }, r)
            })
            .collect();

        let ekf = filter();
        let mut execution = FilterExecution::new("test", PlanarState::planar(600.0, 600.0), 0.01);
        for _ in 0..5000 {
            if ekf.iterate(&mut execution, &observations) < 1e-6 {
                break;
            }
        }

        let error = (execution.state().mean - target).norm();
        assert!(error < 0.01, "error {error}");
        assert_eq!(execution.contributing(), vec![0, 1, 2]);
    }

    #[test]
    fn test_tdoa_and_range_converge() {
        let target = PlanarState::planar(700.0, 900.0);
        let a = sensor("a", 0.0, 0.0);
        let b = sensor("b", 2000.0, 0.0);
        let c = sensor("c", 0.0, 2000.0);
        let tdoa = |s1: &Sensor, s2: &Sensor| {
            ((s1.position - target).norm() - (s2.position - target).norm()) / SPEED_OF_LIGHT
        };
        let observations = vec![
            obs(1, ObservationGeometry::Range { sensor: c.clone() }, (c.position - target).norm()),
            obs(2, ObservationGeometry::Tdoa { sensor: a.clone(), paired: b.clone() }, tdoa(&a, &b)),
            obs(3, ObservationGeometry::Tdoa { sensor: a.clone(), paired: c.clone() }, tdoa(&a, &c)),
        ];

        let ekf = filter();
        let mut execution = FilterExecution::new("test", PlanarState::planar(900.0, 600.0), 0.01);
        for _ in 0..20_000 {
            ekf.iterate(&mut execution, &observations);
            if execution.is_settled(1e-6) {
                break;
            }
        }

        let error = (execution.state().mean - target).norm();
        assert!(error < 1.0, "error {error}");
    }

    #[test]
    fn test_bearing_reference_used_across_wrap() {
        // Sensor at origin; state just below the east axis (bearing ~355°),
        // measured bearing 5°. A range observation pulls the state north.
        let origin = sensor("a", 0.0, 0.0);
        let observations = vec![
            obs(1, ObservationGeometry::Range { sensor: sensor("r", 1000.0, 500.0) }, 400.0),
            obs(2, ObservationGeometry::Aoa { sensor: origin }, 5.0_f64.to_radians()),
        ];
        let state = EkfState::new(
            PlanarState::planar(1000.0, -1000.0 * 5.0_f64.to_radians().tan()),
            StateCovariance::scaled_identity(1.0),
        );

        let ekf = filter();
        let update = ekf.update(&ekf.predict(&state), &observations);
        let aoa = update.diagnostics.iter().find(|d| d.kind == ObservationKind::Aoa).unwrap();

        assert!((aoa.innovation - 10.0).abs() < 1e-6, "innovation {}", aoa.innovation);
        // Bearing correction pushes the state counter-clockwise (north here).
        assert!(aoa.correction.northing() > 0.0);
    }
}
