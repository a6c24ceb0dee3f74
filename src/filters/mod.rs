//! Geolocation filters
//!
//! - [`ekf::FusedEkf`]: Extended Kalman Filter fusing Range, TDOA and AOA
//!   observations against a shared prediction
//! - [`initial::InitialStateSelector`]: seeds for one or more filter executions

pub mod ekf;
pub mod initial;
