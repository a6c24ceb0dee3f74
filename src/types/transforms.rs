//! Typed transformation matrices
//!
//! Matrices that transform vectors between spaces, with type-level
//! encoding of source and target spaces.

use ::core::marker::PhantomData;
use nalgebra::{RealField, SMatrix, Scalar};

use super::spaces::{
    Innovation, InnovationSpace, MeasurementCovariance, MeasurementSpace, StateCovariance,
    StateSpace, StateVector, Vector,
};

// ============================================================================
// Transform Matrix
// ============================================================================

/// A transformation matrix that maps vectors from one space to another.
///
/// # Type Parameters
///
/// - `T`: Scalar type
/// - `ROWS`: Number of rows (dimension of target space)
/// - `COLS`: Number of columns (dimension of source space)
/// - `To`: Target space marker
/// - `From`: Source space marker
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Transform<T: Scalar, const ROWS: usize, const COLS: usize, To, From> {
    inner: SMatrix<T, ROWS, COLS>,
    _marker: PhantomData<(To, From)>,
}

impl<T: Scalar, const ROWS: usize, const COLS: usize, To, From> Transform<T, ROWS, COLS, To, From> {
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, ROWS, COLS>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, ROWS, COLS> {
        &self.inner
    }
}

impl<T: Scalar + Copy, const ROWS: usize, const COLS: usize, To: Clone, From: Clone> Copy
    for Transform<T, ROWS, COLS, To, From>
where
    SMatrix<T, ROWS, COLS>: Copy,
{
}

impl<T: RealField + Copy, const ROWS: usize, const COLS: usize, To, From>
    Transform<T, ROWS, COLS, To, From>
{
    /// True when every entry is finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|v| v.is_finite())
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// Observation matrix (Jacobian): StateSpace -> MeasurementSpace
pub type ObservationMatrix<T, const M: usize, const N: usize> =
    Transform<T, M, N, MeasurementSpace, StateSpace>;

/// Kalman gain: InnovationSpace -> StateSpace
pub type KalmanGain<T, const N: usize, const M: usize> =
    Transform<T, N, M, StateSpace, InnovationSpace>;

/// A single-row Jacobian of a scalar observation with respect to `[easting, northing]`.
pub type PlanarJacobian = ObservationMatrix<f64, 1, 2>;

// ============================================================================
// Specific Transform Applications
// ============================================================================

impl<T: RealField + Copy> ObservationMatrix<T, 1, 2> {
    /// Builds a row Jacobian `[d/de, d/dn]`.
    #[inline]
    pub fn row(d_easting: T, d_northing: T) -> Self {
        Self::from_matrix(SMatrix::<T, 1, 2>::new(d_easting, d_northing))
    }
}

impl<T: RealField + Copy, const M: usize, const N: usize> ObservationMatrix<T, M, N> {
    /// Projects state covariance to measurement space: H * P * H^T
    #[inline]
    pub fn project_covariance(&self, cov: &StateCovariance<T, N>) -> MeasurementCovariance<T, M> {
        MeasurementCovariance::from_matrix(self.inner * cov.as_matrix() * self.inner.transpose())
    }
}

impl<T: RealField + Copy, const N: usize, const M: usize> KalmanGain<T, N, M> {
    /// Applies the Kalman gain to an innovation vector.
    #[inline]
    pub fn correct(&self, innovation: &Innovation<T, M>) -> StateVector<T, N> {
        StateVector::from_svector(self.inner * innovation.as_svector())
    }
}

// ============================================================================
// Kalman Gain Computation
// ============================================================================

/// Computes the innovation covariance.
///
/// S = H * P * H^T + R
pub fn compute_innovation_covariance<T: RealField + Copy, const N: usize, const M: usize>(
    state_cov: &StateCovariance<T, N>,
    obs_matrix: &ObservationMatrix<T, M, N>,
    meas_noise: &MeasurementCovariance<T, M>,
) -> MeasurementCovariance<T, M> {
    let h_p_ht = obs_matrix.project_covariance(state_cov);
    MeasurementCovariance::from_matrix(h_p_ht.as_matrix() + meas_noise.as_matrix())
}

/// Computes the Kalman gain matrix.
///
/// K = P * H^T * S^{-1}
///
/// Returns `None` when S is singular or the result is not finite.
pub fn compute_kalman_gain<T: RealField + Copy, const N: usize, const M: usize>(
    state_cov: &StateCovariance<T, N>,
    obs_matrix: &ObservationMatrix<T, M, N>,
    innovation_cov: &MeasurementCovariance<T, M>,
) -> Option<KalmanGain<T, N, M>> {
    let s_inv = innovation_cov.as_matrix().try_inverse()?;
    let k = state_cov.as_matrix() * obs_matrix.as_matrix().transpose() * s_inv;

    let gain = KalmanGain::from_matrix(k);
    gain.is_finite().then_some(gain)
}

/// Covariance reduction contributed by one observation.
///
/// ΔP = K * H * P
pub fn covariance_reduction<T: RealField + Copy, const N: usize, const M: usize>(
    state_cov: &StateCovariance<T, N>,
    kalman_gain: &KalmanGain<T, N, M>,
    obs_matrix: &ObservationMatrix<T, M, N>,
) -> StateCovariance<T, N> {
    StateCovariance::from_matrix(kalman_gain.as_matrix() * obs_matrix.as_matrix() * state_cov.as_matrix())
}

/// Wraps a raw vector as a typed innovation.
#[inline]
pub fn innovation_of<T: RealField + Copy>(value: T) -> Innovation<T, 1> {
    Vector::from_array([value])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innovation_covariance_scalar() {
        let p: StateCovariance<f64, 2> = StateCovariance::scaled_identity(2.0);
        let h = ObservationMatrix::row(0.6, 0.8);
        let r = MeasurementCovariance::from_matrix(nalgebra::matrix![0.25]);

        // H P H^T = 2 * (0.36 + 0.64) = 2
        let s = compute_innovation_covariance(&p, &h, &r);
        assert!((s.as_matrix()[(0, 0)] - 2.25).abs() < 1e-12);
    }

    #[test]
    fn test_kalman_gain_application() {
        let p: StateCovariance<f64, 2> = StateCovariance::scaled_identity(1.0);
        let h = ObservationMatrix::row(1.0, 0.0);
        let r = MeasurementCovariance::from_matrix(nalgebra::matrix![1.0]);
        let s = compute_innovation_covariance(&p, &h, &r);

        let k = compute_kalman_gain(&p, &h, &s).unwrap();
        let correction = k.correct(&innovation_of(4.0));

        assert!((correction.easting() - 2.0).abs() < 1e-12);
        assert!(correction.northing().abs() < 1e-12);
    }

    #[test]
    fn test_singular_innovation_covariance() {
        let p: StateCovariance<f64, 2> = StateCovariance::zeros();
        let h = ObservationMatrix::row(1.0, 0.0);
        let s = compute_innovation_covariance(&p, &h, &MeasurementCovariance::zeros());

        assert!(compute_kalman_gain(&p, &h, &s).is_none());
    }

    #[test]
    fn test_covariance_reduction() {
        let p: StateCovariance<f64, 2> = StateCovariance::scaled_identity(1.0);
        let h = ObservationMatrix::row(1.0, 0.0);
        let r = MeasurementCovariance::from_matrix(nalgebra::matrix![1.0]);
        let s = compute_innovation_covariance(&p, &h, &r);
        let k = compute_kalman_gain(&p, &h, &s).unwrap();

        let dp = covariance_reduction(&p, &k, &h);
        assert!((dp.as_matrix()[(0, 0)] - 0.5).abs() < 1e-12);
        assert!(dp.as_matrix()[(1, 1)].abs() < 1e-12);
    }
}
