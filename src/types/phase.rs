//! Filter phase markers and update statistics

// ============================================================================
// Filter Phase Markers
// ============================================================================

/// Marker type indicating a predicted filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicted;

/// Marker type indicating an updated filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Updated;

// ============================================================================
// Update Statistics
// ============================================================================

/// Statistics from a fused update, reporting observations that could not be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Observations that contributed a correction
    pub applied: usize,
    /// Observations skipped because the state sat on a sensor
    pub undefined_jacobian_count: usize,
    /// Observations skipped because the innovation covariance was singular
    pub singular_covariance_count: usize,
    /// Updates discarded because the fused result was not finite
    pub non_finite_count: usize,
}

impl UpdateStats {
    /// Returns true if any numerical issues were encountered.
    pub fn has_issues(&self) -> bool {
        self.skipped() > 0 || self.non_finite_count > 0
    }

    /// Observations left out of the update.
    #[inline]
    pub fn skipped(&self) -> usize {
        self.undefined_jacobian_count + self.singular_covariance_count
    }

    /// Accumulates another update's counts.
    pub fn accumulate(&mut self, other: &UpdateStats) {
        self.applied += other.applied;
        self.undefined_jacobian_count += other.undefined_jacobian_count;
        self.singular_covariance_count += other.singular_covariance_count;
        self.non_finite_count += other.non_finite_count;
    }
}
