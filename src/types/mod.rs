//! Core types: typed vector spaces, filter phases, observations, mission
//! configuration and results

pub mod mission;
pub mod observation;
pub mod phase;
pub mod results;
pub mod spaces;
pub mod transforms;
