//! Result summarization
//!
//! Turns a filter execution into a [`GeolocationResult`]: a geographic
//! position, a confidence ellipse from the 2x2 covariance, and a scaled
//! measurement residual used to rank competing estimates.

use nalgebra::{RealField, SMatrix};
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::filters::ekf::FilterExecution;
use crate::models::geodesy::{Geodesy, Zone};
use crate::models::observation::shortest_turn;
use crate::types::observation::ObservationKind;
use crate::types::results::{ConfidenceEllipse, GeolocationResult, ObservationDiagnostic};
use crate::types::spaces::PlanarCovariance;

/// Misfit scale for metre-valued observations (Range, TDOA).
pub const DISTANCE_RESIDUAL_SCALE: f64 = 1000.0;
/// Misfit scale for degree-valued observations (AOA).
pub const BEARING_RESIDUAL_SCALE: f64 = 360.0;

// ============================================================================
// Confidence Level
// ============================================================================

/// Multiplier applied to the square-root eigenvalues of the covariance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// 50% (CEP)
    #[default]
    Cep50,
    P90,
    P95,
    P99,
    Custom(f64),
}

impl ConfidenceLevel {
    /// Chi-square value with two degrees of freedom for the level.
    pub fn multiplier(&self) -> f64 {
        match self {
            ConfidenceLevel::Cep50 => 1.39,
            ConfidenceLevel::P90 => 4.605,
            ConfidenceLevel::P95 => 5.991,
            ConfidenceLevel::P99 => 9.210,
            ConfidenceLevel::Custom(k) => *k,
        }
    }
}

// ============================================================================
// Eigen Decomposition
// ============================================================================

/// Eigen decomposition of a 2x2 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eigen2<T> {
    /// Larger eigenvalue first.
    pub values: [T; 2],
    /// Unit eigenvector of the larger eigenvalue.
    pub major_axis: [T; 2],
}

/// Closed-form eigen decomposition of `[[a, b], [c, d]]`.
///
/// A negative discriminant (possible for a slightly asymmetric matrix) is
/// treated as zero. The eigenvector is taken from `(b, λ - a)`, then from
/// `(λ - d, c)`, and falls back to the easting axis when both vanish, as
/// they do for any multiple of the identity.
pub fn eigen_decomposition<T: RealField + Float + Copy>(m: &SMatrix<T, 2, 2>) -> Eigen2<T> {
    let two = T::one() + T::one();
    let four = two * two;
    let (a, b, c, d) = (m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]);

    let trace = a + d;
    let discriminant = Float::max((a - d) * (a - d) + four * b * c, T::zero());
    let root = Float::sqrt(discriminant);
    let major = (trace + root) / two;
    let minor = (trace - root) / two;

    let tolerance = <T as Float>::epsilon() * Float::max(Float::abs(trace), T::one());
    let candidates = [(b, major - a), (major - d, c)];
    let major_axis = candidates
        .iter()
        .map(|&(x, y)| (x, y, Float::hypot(x, y)))
        .find(|&(_, _, n)| n > tolerance)
        .map(|(x, y, n)| [x / n, y / n])
        .unwrap_or([T::one(), T::zero()]);

    Eigen2 {
        values: [major, minor],
        major_axis,
    }
}

/// Confidence ellipse of a planar covariance.
pub fn confidence_ellipse(covariance: &PlanarCovariance, level: ConfidenceLevel) -> ConfidenceEllipse {
    let eigen = eigen_decomposition(covariance.as_matrix());
    let k = level.multiplier();
    let [vx, vy] = eigen.major_axis;

    let mut rotation = if vx == 0.0 {
        core::f64::consts::FRAC_PI_2
    } else {
        (vy / vx).atan()
    };
    if rotation < 0.0 {
        rotation += core::f64::consts::TAU;
    }

    ConfidenceEllipse {
        semi_major: eigen.values[0].max(0.0).sqrt() * k,
        semi_minor: eigen.values[1].max(0.0).sqrt() * k,
        rotation,
    }
}

// ============================================================================
// Measurement Residual
// ============================================================================

/// Mean scaled misfit between predicted and measured values.
///
/// Range and TDOA misfits are divided by 1000 (metres), AOA misfits by 360
/// (degrees, taken the short way round). An estimate no observation
/// contributed to has nothing to vouch for it and scores infinity.
pub fn measurement_residual(diagnostics: &[ObservationDiagnostic]) -> f64 {
    if diagnostics.is_empty() {
        return f64::INFINITY;
    }
    let total: f64 = diagnostics
        .iter()
        .map(|d| match d.kind {
            ObservationKind::Range | ObservationKind::Tdoa => {
                (d.predicted - d.measured).abs() / DISTANCE_RESIDUAL_SCALE
            }
            ObservationKind::Aoa => {
                shortest_turn(d.predicted, d.measured).abs() / BEARING_RESIDUAL_SCALE
            }
        })
        .sum();
    total / diagnostics.len() as f64
}

// ============================================================================
// Summarizer
// ============================================================================

/// Produces results in a mission's geographic frame.
pub struct Summarizer<'a> {
    geodesy: &'a dyn Geodesy,
    zone: Zone,
    confidence: ConfidenceLevel,
}

impl<'a> Summarizer<'a> {
    pub fn new(geodesy: &'a dyn Geodesy, zone: Zone, confidence: ConfidenceLevel) -> Self {
        Self {
            geodesy,
            zone,
            confidence,
        }
    }

    /// Summarizes the current state of `execution`.
    pub fn summarize(&self, execution: &FilterExecution, converged: bool) -> GeolocationResult {
        let state = execution.state();
        let position = self.geodesy.unproject(&state.mean, self.zone);

        GeolocationResult {
            position,
            planar: [state.mean.easting(), state.mean.northing()],
            ellipse: confidence_ellipse(&state.covariance, self.confidence),
            state_residual: execution.residual(),
            measurement_residual: measurement_residual(execution.diagnostics()),
            iterations: execution.iterations(),
            converged,
            observations: execution.contributing(),
            seed: execution.seed().to_string(),
        }
    }
}
