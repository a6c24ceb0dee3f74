//! Result listener

use crate::types::results::ComputeResults;

/// Receives results from a mission worker.
///
/// Called synchronously on the worker thread; implementations should return
/// quickly.
pub trait ResultListener: Send + Sync {
    /// Called once per dispatch. Forwards the best result to
    /// [`on_position`](Self::on_position) unless overridden.
    fn on_results(&self, results: &ComputeResults) {
        let best = &results.best;
        self.on_position(
            &results.mission_id,
            best.position.lat,
            best.position.lon,
            best.ellipse.semi_major,
            best.ellipse.semi_minor,
            best.ellipse.rotation,
        );
    }

    /// Position with its confidence ellipse (metres, rotation in radians).
    #[allow(unused_variables)]
    fn on_position(
        &self,
        mission_id: &str,
        lat: f64,
        lon: f64,
        semi_major: f64,
        semi_minor: f64,
        rotation: f64,
    ) {
    }
}

/// Listener that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl ResultListener for NullListener {}
