//! Result summarization utilities
//!
//! Confidence ellipses, measurement residuals and geographic output.

mod summary;

pub use summary::*;
