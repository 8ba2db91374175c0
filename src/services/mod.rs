//! Engine services

pub mod pipeline;
pub mod probe_cycle;

pub use pipeline::NodePipeline;
pub use probe_cycle::{CycleConfig, CycleReport, ProbeEngine};
