//! Mission orchestration: staged observations, the worker loop and its owner

pub mod controller;
pub mod listener;
pub mod manager;
pub mod staging;

pub use controller::{ControllerState, ExecutionController, StopSignal};
pub use listener::{NullListener, ResultListener};
pub use manager::{Asset, MissionManager};
pub use staging::{ObservationSet, StagedObservations};
