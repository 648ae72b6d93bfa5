//! Vitals monitor daemon
//!
//! Runs one simulated monitoring session per configured device and serves
//! their readings, statistics and alerts over HTTP.

pub mod api;
pub mod config;
