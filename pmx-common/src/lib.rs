//! # PMX Common Library
//!
//! Shared code for the PMX photo metadata tools:
//! - Timestamp type distinguishing aware and naive date/times
//! - Human-readable formatting of time deltas and UTC offsets
//! - Configuration file resolution and loading
//! - Logging setup

pub mod config;
pub mod error;
pub mod human_time;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use time::Timestamp;
