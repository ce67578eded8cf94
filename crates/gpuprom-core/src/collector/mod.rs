//! GPU telemetry collection.
//!
//! Gathers everything one snapshot needs from nvidia-smi, sysfs, `/proc`,
//! docker, lspci and the optional GDDR6 helper. All host access goes
//! through two seams so the whole pipeline runs against mocks in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Collector                           │
//! │  ┌────────────┐  ┌─────────────────┐  ┌──────────────────┐   │
//! │  │ SmiSource  │  │ BusErrorReader  │  │ ProcessFactCache │   │
//! │  │ -q -x XML  │  │ aer_dev_*       │  │ exe, stat        │   │
//! │  └─────┬──────┘  │ VendorResolver  │  │ ContainerResolver│   │
//! │        │         │ MemoryTempReader│  └────────┬─────────┘   │
//! │        │         └────────┬────────┘           │             │
//! │        └──────────────────┼────────────────────┘             │
//! │                ┌──────────┴───────────┐                      │
//! │                │ FileSystem  CommandRunner (traits)          │
//! │                └──────────┬───────────┘                      │
//! └───────────────────────────┼──────────────────────────────────┘
//!               ┌─────────────┼─────────────┐
//!        ┌──────▼──────┐ ┌────▼──────┐ ┌────▼──────┐
//!        │ RealFs      │ │ MockFs    │ │ Scenarios │
//!        │ RealRunner  │ │ MockRunner│ │ (fixture) │
//!        └─────────────┘ └───────────┘ └───────────┘
//! ```
//!
//! # Usage
//!
//! ## Production
//!
//! ```ignore
//! use gpuprom_core::collector::{Collector, RealFs, RealRunner, SmiSource};
//!
//! let mut collector = Collector::new(RealFs::new(), RealRunner::new(), SmiSource::default());
//! let snapshot = collector.collect_snapshot().unwrap();
//! ```
//!
//! ## Testing (with mocks)
//!
//! ```
//! use gpuprom_core::collector::{Collector, MockFs, MockRunner, SmiSource};
//!
//! let mut collector = Collector::new(
//!     MockFs::gpu_host(),
//!     MockRunner::gpu_host(),
//!     SmiSource::default(),
//! );
//! let snapshot = collector.collect_snapshot().unwrap();
//! assert_eq!(snapshot.gpus.len(), 2);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod container;
pub mod memtemp;
pub mod mock;
pub mod pcie;
pub mod process;
pub mod procfs;
pub mod smi;
pub mod traits;

pub use collector::{Collector, CollectorTiming};
pub use container::{ContainerError, ContainerResolver};
pub use memtemp::{HelperError, MemoryTempReader};
pub use mock::{MockFs, MockRunner};
pub use pcie::{BusErrorReader, BusErrorReason, VendorError, VendorResolver};
pub use process::ProcessFactCache;
pub use smi::{SmiReport, SmiSource, SourceError};
pub use traits::{CommandOutput, CommandRunner, FileSystem, RealFs, RealRunner};
