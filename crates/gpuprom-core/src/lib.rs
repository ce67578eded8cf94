//! gpuprom-core: telemetry snapshot and normalization engine for gpuprom.
//!
//! Provides:
//! - `collector`: GPU, PCIe, process and container data collection
//! - `model`: snapshot data model (GPU records, bus errors, process facts)
//! - `normalize`: vendor value normalization (units, versions, flags)
//! - `store`: published snapshot holder shared with scrape handlers
//! - `exposition`: Prometheus text rendering of a snapshot

pub mod collector;
pub mod exposition;
pub mod model;
pub mod normalize;
pub mod store;

/// Crate version, shared by the CLI `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
