//! Snapshot builder that combines the GPU source with the enrichment
//! collectors.
//!
//! One `collect_snapshot` call is one refresh cycle: fetch the nvidia-smi
//! report, then enrich it with AER counters, PCI vendor names, memory
//! temperatures and per-process facts.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::collector::memtemp::MemoryTempReader;
use crate::collector::pcie::{BusErrorReader, VendorResolver, sysfs_bus_address};
use crate::collector::process::ProcessFactCache;
use crate::collector::smi::{SmiSource, SourceError};
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::model::Snapshot;
use crate::store::SnapshotStore;

/// Timing information for each refresh phase.
///
/// Used for debugging and slow-cycle warnings.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total snapshot collection time.
    pub total: Duration,
    /// Time spent running/reading and parsing nvidia-smi output.
    pub source: Duration,
    /// Time spent on AER, vendor, memory temperature and process lookups.
    pub enrich: Duration,
}

/// Builds [`Snapshot`]s from the host.
///
/// Owns the long-lived caches (process facts, vendor names), so one
/// collector must be reused across cycles.
pub struct Collector<F: FileSystem + Clone, R: CommandRunner + Clone> {
    fs: F,
    runner: R,
    source: SmiSource,
    proc_path: String,
    docker_path: PathBuf,
    bus_errors: BusErrorReader<F>,
    vendors: Option<VendorResolver<R>>,
    memory_temps: Option<MemoryTempReader>,
    processes: ProcessFactCache<F, R>,
    prune_process_cache: bool,
    /// Timing information from the last collect_snapshot call.
    last_timing: Option<CollectorTiming>,
}

impl<F: FileSystem + Clone, R: CommandRunner + Clone> Collector<F, R> {
    pub const DEFAULT_PROC_PATH: &'static str = "/proc";
    pub const DEFAULT_SYS_PATH: &'static str = "/sys";
    pub const DEFAULT_LSPCI: &'static str = "/usr/bin/lspci";

    /// Creates a collector reading `/proc` and `/sys`, with lspci lookups
    /// enabled and no memory temperature helper.
    pub fn new(fs: F, runner: R, source: SmiSource) -> Self {
        let docker_path = PathBuf::from("docker");
        Self {
            bus_errors: BusErrorReader::new(fs.clone(), Self::DEFAULT_SYS_PATH),
            vendors: Some(VendorResolver::new(runner.clone(), Self::DEFAULT_LSPCI)),
            memory_temps: None,
            processes: ProcessFactCache::new(fs.clone(), runner.clone(), Self::DEFAULT_PROC_PATH)
                .with_docker(docker_path.clone()),
            fs,
            runner,
            source,
            proc_path: Self::DEFAULT_PROC_PATH.to_string(),
            docker_path,
            prune_process_cache: false,
            last_timing: None,
        }
    }

    /// Reads process files below `proc_path`. Resets the process cache.
    pub fn with_proc_path(mut self, proc_path: impl Into<String>) -> Self {
        self.proc_path = proc_path.into();
        self.rebuild_process_cache();
        self
    }

    /// Reads AER counters below `sys_path`.
    pub fn with_sys_path(mut self, sys_path: impl Into<String>) -> Self {
        self.bus_errors = BusErrorReader::new(self.fs.clone(), sys_path);
        self
    }

    /// Uses a specific docker CLI binary. Resets the process cache.
    pub fn with_docker(mut self, docker_path: impl Into<PathBuf>) -> Self {
        self.docker_path = docker_path.into();
        self.rebuild_process_cache();
        self
    }

    /// Sets the lspci binary, or disables vendor lookups with `None`.
    pub fn with_lspci(mut self, lspci_path: Option<PathBuf>) -> Self {
        self.vendors = lspci_path.map(|path| VendorResolver::new(self.runner.clone(), path));
        self
    }

    /// Enables the GDDR6 memory temperature helper.
    pub fn with_memory_temp_helper(mut self, helper_path: Option<PathBuf>) -> Self {
        self.memory_temps = helper_path.map(MemoryTempReader::new);
        self
    }

    /// Drops cached process facts whose pid is gone from the latest report.
    pub fn with_process_cache_pruning(mut self, enabled: bool) -> Self {
        self.prune_process_cache = enabled;
        self
    }

    fn rebuild_process_cache(&mut self) {
        self.processes = ProcessFactCache::new(
            self.fs.clone(),
            self.runner.clone(),
            self.proc_path.clone(),
        )
        .with_docker(self.docker_path.clone());
    }

    pub fn source(&self) -> &SmiSource {
        &self.source
    }

    /// Returns the process fact cache.
    pub fn process_cache(&self) -> &ProcessFactCache<F, R> {
        &self.processes
    }

    /// Forgets every cached process fact.
    pub fn clear_process_cache(&mut self) {
        self.processes.clear();
    }

    /// Returns timing information from the last collect_snapshot call.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    /// Runs one refresh cycle and returns the new snapshot.
    ///
    /// Only the GPU source can fail the cycle. Every enrichment lookup
    /// degrades to a sentinel or an empty value.
    pub fn collect_snapshot(&mut self) -> Result<Snapshot, SourceError> {
        let total_start = Instant::now();
        let mut timing = CollectorTiming::default();

        let start = Instant::now();
        let report = self.source.read(&self.fs, &self.runner)?;
        timing.source = start.elapsed();

        let start = Instant::now();
        let mut snapshot = Snapshot {
            timestamp: Utc::now().timestamp(),
            driver_version: report.driver_version,
            cuda_version: report.cuda_version,
            attached_gpus: report.attached_gpus,
            gpus: report.gpus,
            ..Default::default()
        };

        for gpu in &snapshot.gpus {
            snapshot
                .bus_errors
                .insert(gpu.id.clone(), self.bus_errors.read(&gpu.id));
        }

        if let Some(ref mut vendors) = self.vendors {
            for gpu in &snapshot.gpus {
                let info = vendors.resolve(&gpu.id);
                if !info.is_empty() {
                    snapshot.vendors.insert(gpu.id.clone(), info);
                }
            }
        }

        if let Some(ref reader) = self.memory_temps {
            let by_address = reader.read(&self.fs, &self.runner).unwrap_or_else(|e| {
                warn!(error = %e, "memory temperature helper failed");
                BTreeMap::new()
            });
            for gpu in &snapshot.gpus {
                if let Some(&temp) = by_address.get(&sysfs_bus_address(&gpu.id)) {
                    snapshot.memory_temps.insert(gpu.id.clone(), temp);
                }
            }
        }

        let pids = snapshot.referenced_pids();
        for &pid in &pids {
            snapshot.processes.insert(pid, self.processes.resolve(pid));
        }
        if self.prune_process_cache {
            let live: HashSet<u32> = pids.into_iter().collect();
            let removed = self.processes.retain_pids(&live);
            if removed > 0 {
                debug!(removed, "pruned process facts");
            }
        }
        timing.enrich = start.elapsed();

        timing.total = total_start.elapsed();
        debug!(
            gpus = snapshot.gpus.len(),
            processes = snapshot.processes.len(),
            source_ms = timing.source.as_millis() as u64,
            enrich_ms = timing.enrich.as_millis() as u64,
            "snapshot collected"
        );
        self.last_timing = Some(timing);

        Ok(snapshot)
    }

    /// Collects a snapshot and publishes it. On error the store keeps its
    /// previous snapshot.
    pub fn refresh(&mut self, store: &SnapshotStore) -> Result<Arc<Snapshot>, SourceError> {
        let snapshot = self.collect_snapshot()?;
        Ok(store.publish(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{
        CONTAINER_ID, CONTAINERIZED_PID, GDDR6_HELPER, LSPCI, MockFs, MockRunner, NVIDIA_SMI,
        TWO_GPU_REPORT,
    };
    use crate::model::BusErrorCounts;

    fn host_collector() -> (Collector<MockFs, MockRunner>, MockFs, MockRunner) {
        let fs = MockFs::gpu_host();
        let runner = MockRunner::gpu_host();
        let collector = Collector::new(fs.clone(), runner.clone(), SmiSource::command(NVIDIA_SMI))
            .with_memory_temp_helper(Some(PathBuf::from(GDDR6_HELPER)));
        (collector, fs, runner)
    }

    #[test]
    fn test_collect_snapshot() {
        let (mut collector, _, _) = host_collector();

        let snapshot = collector.collect_snapshot().unwrap();

        assert!(snapshot.timestamp > 0);
        assert_eq!(snapshot.driver_version, "535.154.05");
        assert_eq!(snapshot.gpus.len(), 2);

        assert_eq!(
            snapshot.bus_errors["00000000:01:00.0"],
            BusErrorCounts {
                fatal: 0,
                non_fatal: 1,
                correctable: 4,
            }
        );
        assert_eq!(
            snapshot.bus_errors["00000000:02:00.0"],
            BusErrorCounts::unknown()
        );

        assert_eq!(snapshot.vendors.len(), 1);
        assert_eq!(
            snapshot.vendors["00000000:01:00.0"].vendor,
            "NVIDIA Corporation"
        );

        assert_eq!(snapshot.memory_temps.len(), 1);
        assert_eq!(snapshot.memory_temps["00000000:01:00.0"], 84);
    }

    #[test]
    fn test_every_referenced_pid_has_facts() {
        let (mut collector, _, _) = host_collector();

        let snapshot = collector.collect_snapshot().unwrap();

        assert_eq!(snapshot.referenced_pids(), vec![1001, 1002, 1003]);
        for pid in snapshot.referenced_pids() {
            assert!(snapshot.processes.contains_key(&pid), "pid {} missing", pid);
        }

        let containerized = &snapshot.processes[&CONTAINERIZED_PID];
        let container = containerized.container.as_ref().unwrap();
        assert_eq!(container.id, CONTAINER_ID);
        assert_eq!(container.name, "trainer");
        assert_eq!(container.started_at, 1_709_294_400.25);
        assert_eq!(containerized.exe, "/usr/bin/python3.11");
        assert_eq!(containerized.start_time, 1_700_002_500.0);

        assert!(snapshot.processes[&1002].container.is_none());
        assert!(snapshot.processes[&1003].container.is_none());
    }

    #[test]
    fn test_process_facts_resolved_once_across_cycles() {
        let (mut collector, fs, runner) = host_collector();

        let first = collector.collect_snapshot().unwrap();
        let second = collector.collect_snapshot().unwrap();

        assert!(Arc::ptr_eq(
            &first.processes[&CONTAINERIZED_PID],
            &second.processes[&CONTAINERIZED_PID]
        ));
        assert_eq!(first.processes, second.processes);
        assert_eq!(runner.call_count("docker"), 1);
        assert_eq!(fs.read_count("/proc/1001/exe"), 1);
        assert_eq!(fs.read_count("/proc/1003/stat"), 1);
        assert_eq!(fs.read_count("/proc/stat"), 1);
        // lspci is cached per GPU, failed lookups included.
        assert_eq!(runner.call_count(LSPCI), 2);
        // nvidia-smi, AER files and the helper are read every cycle.
        assert_eq!(runner.call_count(NVIDIA_SMI), 2);
        assert_eq!(runner.call_count(GDDR6_HELPER), 2);
        assert_eq!(
            fs.read_count("/sys/bus/pci/devices/0000:01:00.0/aer_dev_fatal"),
            2
        );
    }

    #[test]
    fn test_source_failure_leaves_store_untouched() {
        let fs = MockFs::gpu_host();
        let mut collector = Collector::new(fs, MockRunner::new(), SmiSource::command(NVIDIA_SMI));
        let store = SnapshotStore::new();

        let err = collector.refresh(&store).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
        assert!(store.current().is_none());
        assert!(collector.last_timing().is_none());
    }

    #[test]
    fn test_refresh_publishes() {
        let (mut collector, _, _) = host_collector();
        let store = SnapshotStore::new();

        let published = collector.refresh(&store).unwrap();
        let current = store.current().unwrap();
        assert!(Arc::ptr_eq(&published, &current));
        assert_eq!(current.gpus.len(), 2);

        let timing = collector.last_timing().unwrap();
        assert!(timing.total >= timing.source);
        assert!(timing.total >= timing.enrich);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let fixture = "/srv/gpuprom/report.xml";
        let mut fs = MockFs::gpu_host();
        fs.add_file(fixture, TWO_GPU_REPORT);
        let store = SnapshotStore::new();

        let mut collector =
            Collector::new(fs.clone(), MockRunner::new(), SmiSource::fixture(fixture))
                .with_lspci(None);
        let first = collector.refresh(&store).unwrap();

        fs.add_file(fixture, "<nvidia_smi_log><gpu>");
        let mut broken = Collector::new(fs, MockRunner::new(), SmiSource::fixture(fixture))
            .with_lspci(None);
        assert!(matches!(
            broken.refresh(&store),
            Err(SourceError::Malformed(_))
        ));
        assert!(Arc::ptr_eq(&store.current().unwrap(), &first));
    }

    #[test]
    fn test_optional_lookups_disabled() {
        let fs = MockFs::gpu_host();
        let runner = MockRunner::gpu_host();
        let mut collector =
            Collector::new(fs, runner.clone(), SmiSource::command(NVIDIA_SMI)).with_lspci(None);

        let snapshot = collector.collect_snapshot().unwrap();
        assert!(snapshot.vendors.is_empty());
        assert!(snapshot.memory_temps.is_empty());
        assert_eq!(runner.call_count(LSPCI), 0);
        assert_eq!(runner.call_count(GDDR6_HELPER), 0);
    }

    #[test]
    fn test_memory_helper_failure_is_absorbed() {
        let fs = MockFs::gpu_host();
        let mut runner = MockRunner::gpu_host();
        runner.on_failure(GDDR6_HELPER, &["-j"], 1, "cannot map BAR0");
        let mut collector = Collector::new(fs, runner, SmiSource::command(NVIDIA_SMI))
            .with_memory_temp_helper(Some(PathBuf::from(GDDR6_HELPER)));

        let snapshot = collector.collect_snapshot().unwrap();
        assert!(snapshot.memory_temps.is_empty());
        assert_eq!(snapshot.gpus.len(), 2);
    }

    #[test]
    fn test_process_cache_pruning() {
        let (collector, _, _) = host_collector();
        let mut collector = collector.with_process_cache_pruning(true);

        collector.collect_snapshot().unwrap();
        assert_eq!(collector.process_cache().len(), 3);

        // A pid seen in an earlier cycle only.
        collector.processes.resolve(4242);
        assert_eq!(collector.process_cache().len(), 4);

        collector.collect_snapshot().unwrap();
        assert_eq!(collector.process_cache().len(), 3);
        assert!(!collector.process_cache().contains(4242));
    }

    #[test]
    fn test_cache_kept_without_pruning() {
        let (mut collector, _, _) = host_collector();

        collector.collect_snapshot().unwrap();
        collector.processes.resolve(4242);
        collector.collect_snapshot().unwrap();
        assert!(collector.process_cache().contains(4242));

        collector.clear_process_cache();
        assert!(collector.process_cache().is_empty());
    }
}
