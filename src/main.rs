//! Example usage of the geotrack library
//!
//! Locates a simulated emitter with a Fix mission started from all four
//! bounding-box corners, then tracks it briefly while a bearing is added.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use geotrack::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Prints every dispatch.
struct Printer;

impl ResultListener for Printer {
    fn on_results(&self, results: &ComputeResults) {
        for (rank, r) in results.iter().enumerate() {
            println!(
                "  [{}] #{rank} {:>12}: ({:.6}, {:.6})  ellipse {:.1} x {:.1} m @ {:.1}°  residual {:.5}  iterations {}{}",
                results.mission_id,
                r.seed,
                r.position.lat,
                r.position.lon,
                r.ellipse.semi_major,
                r.ellipse.semi_minor,
                r.ellipse.rotation.to_degrees(),
                r.measurement_residual,
                r.iterations,
                if r.converged { "" } else { " (not converged)" },
            );
        }
    }
}

/// Simulated sensors around an origin, with the emitter at a planar offset.
struct Scenario {
    plane: LocalTangentPlane,
    target: PlanarState,
}

impl Scenario {
    fn site(&self, asset: &str, easting: f64, northing: f64) -> (SensorReport, PlanarState) {
        let position = PlanarState::planar(easting, northing);
        let ll = self.plane.unproject(&position, self.plane.zone_of(0.0, 0.0));
        (SensorReport::new(asset, ll.lat, ll.lon), position)
    }

    fn range(&self, id: u64, asset: &str, easting: f64, northing: f64) -> ObservationReport {
        let (site, position) = self.site(asset, easting, northing);
        ObservationReport::range(id, site, (position - self.target).norm())
    }

    fn aoa(&self, id: u64, asset: &str, easting: f64, northing: f64) -> ObservationReport {
        let (site, position) = self.site(asset, easting, northing);
        let delta = self.target - position;
        let bearing = delta.northing().atan2(delta.easting()).rem_euclid(std::f64::consts::TAU);
        ObservationReport::aoa(id, site, bearing)
    }

    fn tdoa(&self, id: u64, a: (&str, f64, f64), b: (&str, f64, f64)) -> ObservationReport {
        let (site_a, pa) = self.site(a.0, a.1, a.2);
        let (site_b, pb) = self.site(b.0, b.1, b.2);
        let seconds = ((pa - self.target).norm() - (pb - self.target).norm())
            / geotrack::models::observation::SPEED_OF_LIGHT;
        ObservationReport::tdoa(id, site_a, site_b, seconds)
    }
}

fn main() -> geotrack::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("geotrack: EKF geolocation");
    println!("=========================\n");

    let origin = LatLon::new(-31.95, 115.86);
    let scenario = Scenario {
        plane: LocalTangentPlane::new(origin),
        target: PlanarState::planar(1000.0, 1000.0),
    };
    let geodesy: Arc<dyn Geodesy> = Arc::new(scenario.plane);

    println!("Fix, all four box corners:");
    let fix = MissionManager::new(
        MissionConfig::new("fix-demo", MissionMode::Fix)
            .with_target(TargetConfig::new("t-1", "beacon"))
            .with_defaults()
            .with_initial_state(InitialStateMode::BoxAllOut)
            .with_default_variances(DefaultVariances {
                range: Some(1.0),
                tdoa: Some(1.0),
                aoa: Some(0.01),
            }),
        Arc::clone(&geodesy),
        Arc::new(Printer),
    )?;
    fix.add_observation(scenario.range(1, "alpha", 0.0, 0.0))?;
    fix.add_observation(scenario.range(2, "bravo", 2500.0, 0.0))?;
    fix.add_observation(scenario.tdoa(3, ("alpha", 0.0, 0.0), ("charlie", 0.0, 2500.0)))?;
    fix.add_observation(scenario.aoa(4, "delta", -100.0, 100.0))?;
    fix.start()?;
    let state = fix.wait()?;
    println!("  final state: {state:?}\n");

    println!("Track, adding a bearing while running:");
    let track = MissionManager::new(
        MissionConfig::new("track-demo", MissionMode::Track)
            .with_target(TargetConfig::new("t-1", "beacon"))
            .with_defaults()
            .with_initial_state(InitialStateMode::Random)
            .with_rng_seed(7)
            .with_dispatch_period(Duration::from_millis(200))
            .with_throttle(Duration::from_millis(1)),
        geodesy,
        Arc::new(Printer),
    )?;
    track.add_observation(scenario.range(1, "alpha", 0.0, 0.0))?;
    track.add_observation(scenario.range(2, "bravo", 2500.0, 0.0))?;
    track.start()?;
    thread::sleep(Duration::from_millis(500));
    track.add_observation(scenario.range(3, "charlie", 0.0, 2500.0))?;
    thread::sleep(Duration::from_millis(700));
    let state = track.shutdown()?;
    println!("  final state: {state:?}");

    Ok(())
}
