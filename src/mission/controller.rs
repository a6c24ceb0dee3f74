//! Fix/Track execution control
//!
//! The controller runs on the mission worker thread and owns every
//! [`FilterExecution`]. It talks to the rest of the system through the staged
//! observation container (read-only snapshots), the [`StopSignal`] and the
//! [`ResultListener`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::filters::ekf::{FilterExecution, FusedEkf};
use crate::mission::listener::ResultListener;
use crate::mission::staging::{ObservationSet, StagedObservations};
use crate::models::geodesy::{Geodesy, Zone};
use crate::types::mission::{InitialStateMode, MissionMode, MissionSettings};
use crate::types::results::{ComputeResults, GeolocationResult};
use crate::utils::Summarizer;

// ============================================================================
// State and Stop Signal
// ============================================================================

/// Lifecycle of a mission worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ControllerState {
    #[default]
    Idle,
    Running,
    /// The run finished on its own: a fix completed, converged or not.
    Converged,
    Stopped,
}

#[derive(Debug, Default)]
struct StopInner {
    requested: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cooperative stop request shared between a mission and its worker.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop and wakes any throttled wait.
    pub fn request_stop(&self) {
        self.inner.requested.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    #[inline]
    pub fn is_stop_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Sleeps for `timeout` or until a stop is requested, whichever is first.
    /// Returns whether a stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_stop_requested() {
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stop_requested()
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives filter executions for one mission run.
pub struct ExecutionController {
    settings: Arc<MissionSettings>,
    ekf: FusedEkf,
    staged: Arc<StagedObservations>,
    geodesy: Arc<dyn Geodesy>,
    listener: Arc<dyn ResultListener>,
    zone: Zone,
    stop: StopSignal,
    state: Arc<RwLock<ControllerState>>,
    dispatches: u64,
}

impl ExecutionController {
    pub fn new(
        settings: Arc<MissionSettings>,
        staged: Arc<StagedObservations>,
        geodesy: Arc<dyn Geodesy>,
        listener: Arc<dyn ResultListener>,
        zone: Zone,
        stop: StopSignal,
    ) -> Self {
        let ekf = FusedEkf::new(settings.process_noise);
        Self {
            settings,
            ekf,
            staged,
            geodesy,
            listener,
            zone,
            stop,
            state: Arc::new(RwLock::new(ControllerState::Idle)),
            dispatches: 0,
        }
    }

    /// Shares the state cell so other threads can observe the lifecycle.
    pub fn with_state_cell(mut self, state: Arc<RwLock<ControllerState>>) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// Number of result dispatches made so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    fn set_state(&self, state: ControllerState) {
        *self.state.write() = state;
    }

    /// Runs the mission to completion or until stopped.
    pub fn run(&mut self, executions: Vec<FilterExecution>) -> ControllerState {
        self.set_state(ControllerState::Running);
        tracing::info!(
            mission = %self.settings.mission_id,
            mode = ?self.settings.mode,
            seeds = executions.len(),
            "mission worker started"
        );

        let outcome = match self.settings.mode {
            MissionMode::Fix => self.run_fix(executions),
            MissionMode::Track => self.run_track(executions),
        };

        self.set_state(outcome);
        tracing::info!(
            mission = %self.settings.mission_id,
            state = ?outcome,
            dispatches = self.dispatches,
            "mission worker finished"
        );
        outcome
    }

    /// Iterates every seed on one snapshot, then dispatches ranked results once.
    pub fn run_fix(&mut self, executions: Vec<FilterExecution>) -> ControllerState {
        let set = self.staged.snapshot();
        if set.is_empty() {
            tracing::warn!(mission = %self.settings.mission_id, "no observations staged, nothing to fix");
            return ControllerState::Stopped;
        }

        let summarizer = Summarizer::new(self.geodesy.as_ref(), self.zone, self.settings.confidence);
        let threshold = self.settings.convergence_threshold;
        let single_out = self.settings.initial_state == InitialStateMode::BoxSingleOut;
        let mut results: Vec<GeolocationResult> = Vec::new();
        let mut stopped = false;

        for mut execution in executions {
            stopped = self.iterate_fix(&mut execution, &set);
            let converged = execution.is_settled(threshold);

            if execution.iterations() > 0 {
                let result = summarizer.summarize(&execution, converged);
                tracing::debug!(
                    seed = %result.seed,
                    iterations = result.iterations,
                    converged,
                    state_residual = result.state_residual,
                    measurement_residual = result.measurement_residual,
                    "execution finished"
                );
                if !converged && !stopped {
                    tracing::warn!(
                        seed = %result.seed,
                        iterations = result.iterations,
                        "fix did not converge within the iteration limit"
                    );
                }
                if execution.stats().has_issues() {
                    tracing::warn!(seed = %result.seed, stats = ?execution.stats(), "observations were skipped");
                }
                results.push(result);
            }

            if stopped || (single_out && converged) {
                break;
            }
        }

        self.dispatch(results);
        if stopped {
            ControllerState::Stopped
        } else {
            ControllerState::Converged
        }
    }

    /// Returns true when interrupted by a stop request.
    fn iterate_fix(&self, execution: &mut FilterExecution, set: &ObservationSet) -> bool {
        let threshold = self.settings.convergence_threshold;
        loop {
            if self.stop.is_stop_requested() {
                return true;
            }
            if self
                .settings
                .max_iterations
                .is_some_and(|max| execution.iterations() >= max)
            {
                return false;
            }
            self.ekf.iterate(execution, set);
            if execution.is_settled(threshold) {
                return false;
            }
        }
    }

    /// Re-estimates with the first seed until stopped, adopting fresh
    /// observation snapshots at dispatch checkpoints.
    pub fn run_track(&mut self, executions: Vec<FilterExecution>) -> ControllerState {
        let Some(mut execution) = executions.into_iter().next() else {
            tracing::warn!(mission = %self.settings.mission_id, "no initial state to track from");
            return ControllerState::Stopped;
        };

        let period = self.settings.dispatch_period;
        let mut active = self.staged.snapshot();
        let mut checkpoint = Instant::now();

        loop {
            if self.stop.is_stop_requested() {
                break;
            }

            if active.is_empty() {
                // Idle until the next checkpoint, then look again.
                self.stop.wait(period.saturating_sub(checkpoint.elapsed()));
                if self.stop.is_stop_requested() {
                    break;
                }
                active = self.adopt(&active);
                checkpoint = Instant::now();
                continue;
            }

            if let Some(throttle) = self.settings.throttle {
                tracing::trace!(?throttle, "throttling");
                self.stop.wait(throttle);
            }

            let residual = self.ekf.iterate(&mut execution, &active);

            if checkpoint.elapsed() >= period && residual < self.settings.dispatch_threshold {
                let converged = execution.is_settled(self.settings.convergence_threshold);
                let summarizer = Summarizer::new(self.geodesy.as_ref(), self.zone, self.settings.confidence);
                let result = summarizer.summarize(&execution, converged);
                self.dispatch(vec![result]);
                checkpoint = Instant::now();
                active = self.adopt(&active);
            }
        }

        ControllerState::Stopped
    }

    fn adopt(&self, current: &ObservationSet) -> ObservationSet {
        let fresh = self.staged.snapshot();
        if fresh.generation() != current.generation() {
            tracing::debug!(
                generation = fresh.generation(),
                observations = fresh.len(),
                "adopted staged observations"
            );
        }
        fresh
    }

    fn dispatch(&mut self, results: Vec<GeolocationResult>) {
        let Some(ranked) = ComputeResults::ranked(self.settings.mission_id.clone(), results) else {
            tracing::debug!(mission = %self.settings.mission_id, "no results to dispatch");
            return;
        };
        for (rank, result) in ranked.iter().enumerate() {
            tracing::debug!(
                rank,
                seed = %result.seed,
                lat = result.position.lat,
                lon = result.position.lon,
                measurement_residual = result.measurement_residual,
                "ranked result"
            );
        }
        self.listener.on_results(&ranked);
        self.dispatches += 1;
        tracing::info!(
            mission = %ranked.mission_id,
            results = ranked.count(),
            dispatches = self.dispatches,
            "dispatched results"
        );
    }
}
