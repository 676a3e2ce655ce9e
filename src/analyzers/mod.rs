//! Resampling of station observations.
//!
//! This module holds the frame types, the temporal aggregator that resamples
//! a frame to a coarser resolution (vector-averaging wind), the date-range
//! query pipeline, and the wind vector helpers used for wind roses.

pub mod aggregate;
pub mod analyzer;
pub mod types;
pub mod utility;
pub mod wind;
