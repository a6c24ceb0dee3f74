//! Mission manager
//!
//! Validates and stages observations, keeps the asset registry, and owns the
//! worker thread that runs the [`ExecutionController`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::filters::initial::InitialStateSelector;
use crate::mission::controller::{ControllerState, ExecutionController, StopSignal};
use crate::mission::listener::ResultListener;
use crate::mission::staging::StagedObservations;
use crate::models::display::DisplayGeometry;
use crate::models::geodesy::{Geodesy, Zone};
use crate::types::mission::{ConfigError, MissionConfig, MissionMode, MissionSettings};
use crate::types::observation::{
    AssetId, Observation, ObservationError, ObservationId, ObservationReport,
};
use crate::types::results::LatLon;
use crate::types::spaces::PlanarState;
use crate::{GeoError, Result};

/// A sensor platform known to the mission.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: AssetId,
    /// Most recently reported location.
    pub location: LatLon,
    pub position: PlanarState,
}

struct Worker {
    handle: JoinHandle<ControllerState>,
    stop: StopSignal,
}

/// One geolocation mission: configuration, staged observations and worker.
pub struct MissionManager {
    settings: Arc<MissionSettings>,
    geodesy: Arc<dyn Geodesy>,
    listener: Arc<dyn ResultListener>,
    staged: Arc<StagedObservations>,
    /// Serializes ingestion so staged observations and assets change together.
    assets: Mutex<BTreeMap<AssetId, Asset>>,
    zone: RwLock<Option<Zone>>,
    worker: Mutex<Option<Worker>>,
    state: Arc<RwLock<ControllerState>>,
}

impl MissionManager {
    /// Resolves `config` and creates an idle mission.
    pub fn new(
        config: MissionConfig,
        geodesy: Arc<dyn Geodesy>,
        listener: Arc<dyn ResultListener>,
    ) -> Result<Self> {
        let settings = config.resolve()?;
        let zone = settings
            .specified_location
            .map(|loc| geodesy.zone_of(loc.lat, loc.lon));

        tracing::debug!(
            mission = %settings.mission_id,
            target = %settings.target.name,
            mode = ?settings.mode,
            initial_state = %settings.initial_state,
            "mission created"
        );

        Ok(Self {
            settings: Arc::new(settings),
            geodesy,
            listener,
            staged: Arc::new(StagedObservations::new()),
            assets: Mutex::new(BTreeMap::new()),
            zone: RwLock::new(zone),
            worker: Mutex::new(None),
            state: Arc::new(RwLock::new(ControllerState::Idle)),
        })
    }

    pub fn settings(&self) -> &MissionSettings {
        &self.settings
    }

    /// Current worker lifecycle state.
    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// Grid zone results are reported in, fixed by the first located input.
    pub fn zone(&self) -> Option<Zone> {
        *self.zone.read()
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Validates, projects and stages an observation.
    ///
    /// Re-submitting an id replaces the staged observation and records the
    /// old value as `previous_value`.
    pub fn add_observation(&self, report: ObservationReport) -> Result<()> {
        let mut observation = self.prepare(&report)?;

        let mut assets = self.assets.lock();
        observation.previous_value = self.staged.get(report.id).map(|o| o.value);
        self.register_assets(&mut assets, &report);
        let replaced = self.staged.insert(observation).is_some();

        tracing::debug!(
            observation = report.id,
            kind = %report.kind,
            asset = %report.sensor.asset,
            replaced,
            "observation staged"
        );
        Ok(())
    }

    /// Removes an observation, and any asset no longer referenced.
    pub fn remove_observation(&self, id: ObservationId) -> Result<Observation> {
        let mut assets = self.assets.lock();
        let removed = self
            .staged
            .remove(id)
            .ok_or(GeoError::UnknownObservation(id))?;

        self.staged.with_map(|map| {
            assets.retain(|asset, _| map.values().any(|o| o.geometry.references(asset)));
        });
        tracing::debug!(observation = id, assets = assets.len(), "observation removed");
        Ok(removed)
    }

    /// Replaces the whole staged set. Nothing changes if any report is invalid.
    pub fn replace_observations(&self, reports: Vec<ObservationReport>) -> Result<()> {
        let observations = reports
            .iter()
            .map(|r| self.prepare(r))
            .collect::<core::result::Result<Vec<_>, _>>()?;

        let mut assets = self.assets.lock();
        let observations: Vec<Observation> = observations
            .into_iter()
            .map(|mut o| {
                o.previous_value = self.staged.get(o.id).map(|old| old.value);
                o
            })
            .collect();

        assets.clear();
        for report in &reports {
            self.register_assets(&mut assets, report);
        }
        let count = observations.len();
        self.staged.replace_all(observations);

        tracing::debug!(observations = count, assets = assets.len(), "staged set replaced");
        Ok(())
    }

    /// Known assets keyed by id.
    pub fn assets(&self) -> BTreeMap<AssetId, Asset> {
        self.assets.lock().clone()
    }

    pub fn observation(&self, id: ObservationId) -> Option<Observation> {
        self.staged.get(id)
    }

    /// Number of staged observations.
    pub fn observation_count(&self) -> usize {
        self.staged.len()
    }

    fn prepare(&self, report: &ObservationReport) -> core::result::Result<Observation, ObservationError> {
        report.validate()?;
        let variance = match report.variance {
            Some(v) => v,
            None => self
                .settings
                .default_variances
                .for_kind(report.kind)
                .ok_or(ObservationError::MissingDefaultVariance { kind: report.kind })?,
        };

        let mut observation = report.to_observation(self.geodesy.as_ref(), variance)?;
        let zone = self.zone_for(report);
        if self.settings.show_measurements {
            observation.display = Some(DisplayGeometry::for_observation(
                &observation,
                self.geodesy.as_ref(),
                zone,
            ));
        }
        Ok(observation)
    }

    fn zone_for(&self, report: &ObservationReport) -> Zone {
        if let Some(zone) = *self.zone.read() {
            return zone;
        }
        let mut slot = self.zone.write();
        *slot.get_or_insert_with(|| self.geodesy.zone_of(report.sensor.lat, report.sensor.lon))
    }

    fn register_assets(&self, assets: &mut BTreeMap<AssetId, Asset>, report: &ObservationReport) {
        for sensor in report.sensors() {
            assets.insert(
                sensor.asset.clone(),
                Asset {
                    id: sensor.asset.clone(),
                    location: sensor.location(),
                    position: self.geodesy.project(sensor.location()),
                },
            );
        }
    }

    // ------------------------------------------------------------------------
    // Worker Lifecycle
    // ------------------------------------------------------------------------

    /// Selects initial states and spawns the mission worker.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Err(GeoError::AlreadyRunning);
        }

        if self.settings.mode == MissionMode::Fix && self.staged.is_empty() {
            return Err(ConfigError::NoObservations.into());
        }

        let positions: BTreeMap<AssetId, PlanarState> = self
            .assets
            .lock()
            .iter()
            .map(|(id, asset)| (id.clone(), asset.position))
            .collect();
        let specified = self
            .settings
            .specified_location
            .map(|loc| self.geodesy.project(loc));
        let selector = InitialStateSelector::from_settings(&self.settings, specified);
        let mut rng = match self.settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let executions = selector.executions(&positions, &mut rng)?;
        let zone = self.zone().ok_or(ConfigError::NoObservations)?;

        let stop = StopSignal::new();
        let mut controller = ExecutionController::new(
            Arc::clone(&self.settings),
            Arc::clone(&self.staged),
            Arc::clone(&self.geodesy),
            Arc::clone(&self.listener),
            zone,
            stop.clone(),
        )
        .with_state_cell(Arc::clone(&self.state));

        *self.state.write() = ControllerState::Running;
        let handle = thread::Builder::new()
            .name(format!("geotrack-{}", self.settings.mission_id))
            .spawn(move || controller.run(executions))
            .map_err(|e| {
                *self.state.write() = ControllerState::Idle;
                GeoError::Spawn(e)
            })?;

        tracing::info!(mission = %self.settings.mission_id, zone = %zone, "mission started");
        *worker = Some(Worker { handle, stop });
        Ok(())
    }

    /// Requests the worker to stop. Does not wait for it.
    pub fn stop(&self) -> Result<()> {
        let worker = self.worker.lock();
        let worker = worker.as_ref().ok_or(GeoError::NotStarted)?;
        worker.stop.request_stop();
        tracing::info!(mission = %self.settings.mission_id, "stop requested");
        Ok(())
    }

    /// Blocks until the worker exits and returns its final state.
    pub fn wait(&self) -> Result<ControllerState> {
        let worker = self.worker.lock().take().ok_or(GeoError::NotStarted)?;
        worker.handle.join().map_err(|_| GeoError::WorkerPanicked)
    }

    /// Stops the worker and waits for it.
    pub fn shutdown(&self) -> Result<ControllerState> {
        self.stop()?;
        self.wait()
    }
}

impl Drop for MissionManager {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.stop.request_stop();
            if worker.handle.join().is_err() {
                tracing::warn!(mission = %self.settings.mission_id, "mission worker panicked");
            }
        }
    }
}
