//! Measurement models and geographic collaborators
//!
//! This module defines the per-type measurement functions and Jacobians, the
//! geodesy trait used to move between lat/lon and the planar frame, and the
//! plottable geometry of each observation.

pub mod display;
pub mod geodesy;
pub mod observation;
