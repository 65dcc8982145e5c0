#![forbid(unsafe_code)]

//! Pathfinder replay: runtime.
//!
//! Wraps the replay kernel with log file reading, full replay,
//! replay sessions with statistics, and drift detection.
//!
//! No classification or store logic lives here; all of it is
//! delegated to the kernel.

pub mod error;
pub mod log_reader;
pub mod replay;
pub mod session;
pub mod drift;
