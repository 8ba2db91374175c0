//! nodeprobe - proxy endpoint probing and statistics
//!
//! Probes a pool of proxy nodes with bounded concurrency and keeps
//! cumulative pass/fail counters per endpoint in a CSV stat store.
//!
//! ## Features
//!
//! - Pluggable reachability: system `ping`, TCP connect, or an HTTP ping service
//! - Per-address deduplication of probe targets
//! - Merge-on-write statistics with atomic saves
//! - Success-rate filtering and node renaming
//! - HTTP ping service exposing `/ping`, `/rate` and `/health`

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod probe;
pub mod services;
pub mod stats;
pub mod store;
pub mod timing;

pub use config::Config;
pub use error::{NodeProbeError, Result};
pub use services::{CycleConfig, CycleReport, ProbeEngine};
