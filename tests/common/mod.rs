//! Common test helpers for geolocation integration tests

#![allow(dead_code)]

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use geotrack::models::observation::SPEED_OF_LIGHT;
use geotrack::prelude::*;

pub const ORIGIN: LatLon = LatLon {
    lat: -31.95,
    lon: 115.86,
};

/// Collects every dispatch for later inspection.
#[derive(Default)]
pub struct CollectingListener {
    results: Mutex<Vec<ComputeResults>>,
}

impl CollectingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<ComputeResults> {
        self.results.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.results.lock().len()
    }

    /// Polls until at least `n` dispatches arrived or `timeout` passed.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.count() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.count() >= n
    }
}

impl ResultListener for CollectingListener {
    fn on_results(&self, results: &ComputeResults) {
        self.results.lock().push(results.clone());
    }
}

/// Sensors and a target laid out in the planar frame around [`ORIGIN`].
pub struct Scenario {
    pub plane: LocalTangentPlane,
    pub target: PlanarState,
}

impl Scenario {
    pub fn new(target_e: f64, target_n: f64) -> Self {
        Self {
            plane: LocalTangentPlane::new(ORIGIN),
            target: PlanarState::planar(target_e, target_n),
        }
    }

    pub fn geodesy(&self) -> Arc<dyn Geodesy> {
        Arc::new(self.plane)
    }

    /// Geographic position of a planar point.
    pub fn latlon(&self, easting: f64, northing: f64) -> LatLon {
        let zone = self.plane.zone_of(ORIGIN.lat, ORIGIN.lon);
        self.plane.unproject(&PlanarState::planar(easting, northing), zone)
    }

    pub fn site(&self, asset: &str, easting: f64, northing: f64) -> SensorReport {
        let ll = self.latlon(easting, northing);
        SensorReport::new(asset, ll.lat, ll.lon)
    }

    /// Exact range from a sensor to the target.
    pub fn range(&self, id: u64, asset: &str, e: f64, n: f64) -> ObservationReport {
        let value = (PlanarState::planar(e, n) - self.target).norm();
        ObservationReport::range(id, self.site(asset, e, n), value)
    }

    /// Exact bearing (radians counter-clockwise from east) from a sensor to the target.
    pub fn aoa(&self, id: u64, asset: &str, e: f64, n: f64) -> ObservationReport {
        let delta = self.target - PlanarState::planar(e, n);
        let bearing = delta.northing().atan2(delta.easting()).rem_euclid(TAU);
        ObservationReport::aoa(id, self.site(asset, e, n), bearing)
    }

    /// Exact arrival-time difference between two sensors, seconds.
    pub fn tdoa(&self, id: u64, a: (&str, f64, f64), b: (&str, f64, f64)) -> ObservationReport {
        let ra = (PlanarState::planar(a.1, a.2) - self.target).norm();
        let rb = (PlanarState::planar(b.1, b.2) - self.target).norm();
        ObservationReport::tdoa(
            id,
            self.site(a.0, a.1, a.2),
            self.site(b.0, b.1, b.2),
            (ra - rb) / SPEED_OF_LIGHT,
        )
    }

    /// Planar distance between a result and the target.
    pub fn error(&self, result: &GeolocationResult) -> f64 {
        let estimate = PlanarState::planar(result.planar[0], result.planar[1]);
        (estimate - self.target).norm()
    }
}

/// Fix-mode configuration with library defaults.
pub fn fix_config(mission: &str, initial: InitialStateMode) -> MissionConfig {
    MissionConfig::new(mission, MissionMode::Fix)
        .with_target(TargetConfig::new("t-1", "beacon"))
        .with_defaults()
        .with_initial_state(initial)
}

/// Track-mode configuration dispatching as often as the residual allows.
pub fn track_config(mission: &str, initial: InitialStateMode) -> MissionConfig {
    MissionConfig::new(mission, MissionMode::Track)
        .with_target(TargetConfig::new("t-1", "beacon"))
        .with_defaults()
        .with_initial_state(initial)
        .with_dispatch_period(Duration::from_millis(0))
}
