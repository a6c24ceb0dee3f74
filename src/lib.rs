//! geotrack: single-target geolocation with an Extended Kalman Filter
//!
//! Estimates the planar position of one emitter from Range, TDOA and AOA
//! observations taken by sensors at known positions.
//!
//! # Features
//!
//! - **Type Safety**: Vector spaces and filter phases encoded in the type system
//! - **Fused Updates**: Every observation corrects the same prediction; the
//!   corrections are summed and applied once per iteration
//! - **Multiple Hypotheses**: Fix missions can start from several seeds and
//!   rank the results
//! - **Live Tracking**: Track missions re-estimate while observations change
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use geotrack::prelude::*;
//!
//! let config = MissionConfig::new("demo", MissionMode::Fix)
//!     .with_target(TargetConfig::new("t-1", "beacon"))
//!     .with_defaults();
//! let geodesy = Arc::new(LocalTangentPlane::new(LatLon::new(-31.95, 115.86)));
//! let mission = MissionManager::new(config, geodesy, Arc::new(NullListener))?;
//!
//! mission.add_observation(ObservationReport::range(
//!     1,
//!     SensorReport::new("alpha", -31.95, 115.86),
//!     1200.0,
//! ))?;
//! mission.start()?;
//! mission.wait()?;
//! # Ok::<(), geotrack::GeoError>(())
//! ```

pub mod types;
pub mod models;
pub mod filters;
pub mod mission;
pub mod utils;

pub mod prelude {
    pub use crate::filters::ekf::*;
    pub use crate::filters::initial::*;
    pub use crate::mission::*;
    pub use crate::models::geodesy::*;
    pub use crate::types::mission::*;
    pub use crate::types::observation::*;
    pub use crate::types::results::*;
    pub use crate::types::spaces::*;
    pub use crate::utils::*;
    pub use crate::{GeoError, Result};
}

use crate::types::mission::ConfigError;
use crate::types::observation::{ObservationError, ObservationId};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Observation(#[from] ObservationError),

    /// The mission worker is already running
    #[error("mission is already running")]
    AlreadyRunning,

    /// `stop` or `wait` before `start`
    #[error("mission has not been started")]
    NotStarted,

    #[error("observation {0} is not staged")]
    UnknownObservation(ObservationId),

    #[error("failed to spawn mission worker")]
    Spawn(#[source] std::io::Error),

    #[error("mission worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = ::core::result::Result<T, GeoError>;
