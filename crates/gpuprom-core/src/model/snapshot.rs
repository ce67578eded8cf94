//! Point-in-time snapshot assembled by one refresh cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::gpu::GpuRecord;

/// Everything gathered in one refresh cycle.
///
/// Never mutated after it is published to the store. Maps are ordered so
/// that rendering identical snapshots produces identical text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Collection time, seconds since epoch.
    pub timestamp: i64,
    pub driver_version: String,
    pub cuda_version: String,
    pub attached_gpus: String,
    /// GPUs in the order the driver reported them.
    pub gpus: Vec<GpuRecord>,
    /// AER counters keyed by GPU id.
    pub bus_errors: BTreeMap<String, BusErrorCounts>,
    /// Facts for every pid referenced by `gpus[*].processes`.
    pub processes: BTreeMap<u32, Arc<ProcessFact>>,
    /// lspci names keyed by GPU id (only GPUs lspci answered for).
    pub vendors: BTreeMap<String, VendorInfo>,
    /// GDDR6 junction temperature in °C keyed by GPU id.
    pub memory_temps: BTreeMap<String, i64>,
}

impl Snapshot {
    /// Unique pids across all GPU process lists, ascending.
    pub fn referenced_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .gpus
            .iter()
            .flat_map(|gpu| gpu.processes.iter().map(|p| p.pid))
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }
}

/// PCIe Advanced Error Reporting totals for one device.
///
/// Each counter is either a count or [`BusErrorCounts::UNKNOWN`]; an
/// unreadable counter is never reported as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusErrorCounts {
    pub fatal: i64,
    pub non_fatal: i64,
    pub correctable: i64,
}

impl BusErrorCounts {
    pub const UNKNOWN: i64 = -1;

    pub fn unknown() -> Self {
        Self {
            fatal: Self::UNKNOWN,
            non_fatal: Self::UNKNOWN,
            correctable: Self::UNKNOWN,
        }
    }
}

impl Default for BusErrorCounts {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Lifetime-constant facts about a process using a GPU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessFact {
    /// Target of `/proc/<pid>/exe`, empty if unreadable.
    pub exe: String,
    /// Start time in seconds since epoch (0 if unknown).
    pub start_time: f64,
    pub container: Option<ContainerIdentity>,
}

/// Docker container a process belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerIdentity {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Container creation time in seconds since epoch (0 if unparsable).
    pub started_at: f64,
}

/// PCI vendor and device names from `lspci -vmm`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorInfo {
    pub vendor: String,
    pub device: String,
    pub subsys_vendor: String,
    pub subsys_device: String,
}

impl VendorInfo {
    pub fn is_empty(&self) -> bool {
        self.vendor.is_empty()
            && self.device.is_empty()
            && self.subsys_vendor.is_empty()
            && self.subsys_device.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GpuProcess;

    fn gpu_with_pids(pids: &[u32]) -> GpuRecord {
        GpuRecord {
            processes: pids
                .iter()
                .map(|&pid| GpuProcess {
                    pid,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_referenced_pids_dedup_sorted() {
        let snapshot = Snapshot {
            gpus: vec![gpu_with_pids(&[30, 10]), gpu_with_pids(&[10, 20])],
            ..Default::default()
        };
        assert_eq!(snapshot.referenced_pids(), vec![10, 20, 30]);
    }

    #[test]
    fn test_bus_errors_default_is_unknown() {
        let counts = BusErrorCounts::default();
        assert_eq!(counts.fatal, -1);
        assert_eq!(counts.non_fatal, -1);
        assert_eq!(counts.correctable, -1);
    }
}
