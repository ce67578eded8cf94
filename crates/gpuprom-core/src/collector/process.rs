//! Per-process facts that stay constant for the lifetime of a pid.
//!
//! Executable path, start time and container identity cannot change while
//! a process lives, and resolving the container means shelling out to
//! docker. The cache resolves each pid once and hands out the same
//! `Arc<ProcessFact>` on every later cycle.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::collector::container::ContainerResolver;
use crate::collector::procfs::{parse_boot_time, parse_stat_starttime};
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::model::ProcessFact;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

/// Resolve-once cache of [`ProcessFact`]s keyed by pid.
///
/// Entries are never evicted implicitly: the driver gives no signal when a
/// pid exits, so a reused pid keeps the facts of its first owner until
/// [`ProcessFactCache::retain_pids`] or [`ProcessFactCache::clear`] drops it.
pub struct ProcessFactCache<F: FileSystem, R: CommandRunner> {
    fs: F,
    containers: ContainerResolver<F, R>,
    proc_path: String,
    /// System boot time (seconds since epoch), read lazily from `/proc/stat`.
    boot_time: Option<u64>,
    facts: HashMap<u32, Arc<ProcessFact>>,
}

impl<F: FileSystem + Clone, R: CommandRunner> ProcessFactCache<F, R> {
    pub fn new(fs: F, runner: R, proc_path: impl Into<String>) -> Self {
        let proc_path = proc_path.into();
        Self {
            containers: ContainerResolver::new(fs.clone(), runner, proc_path.clone()),
            fs,
            proc_path,
            boot_time: None,
            facts: HashMap::new(),
        }
    }
}

impl<F: FileSystem, R: CommandRunner> ProcessFactCache<F, R> {
    /// Uses a specific docker CLI binary for container lookups.
    pub fn with_docker(mut self, docker_path: impl Into<std::path::PathBuf>) -> Self {
        self.containers = self.containers.with_docker(docker_path);
        self
    }

    /// Returns the facts for `pid`, resolving them on first sight only.
    pub fn resolve(&mut self, pid: u32) -> Arc<ProcessFact> {
        if let Some(fact) = self.facts.get(&pid) {
            return Arc::clone(fact);
        }
        let fact = Arc::new(self.resolve_uncached(pid));
        self.facts.insert(pid, Arc::clone(&fact));
        fact
    }

    /// Number of cached pids.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.facts.contains_key(&pid)
    }

    /// Drops every pid not in `live`. Returns how many entries were removed.
    pub fn retain_pids(&mut self, live: &HashSet<u32>) -> usize {
        let before = self.facts.len();
        self.facts.retain(|pid, _| live.contains(pid));
        before - self.facts.len()
    }

    /// Forgets all facts and the memoized boot time.
    pub fn clear(&mut self) {
        self.facts.clear();
        self.boot_time = None;
    }

    fn resolve_uncached(&mut self, pid: u32) -> ProcessFact {
        let exe_path = format!("{}/{}/exe", self.proc_path, pid);
        let exe = match self.fs.read_link(Path::new(&exe_path)) {
            Ok(target) => target.to_string_lossy().into_owned(),
            Err(e) => {
                debug!(pid, error = %e, "cannot read process executable");
                String::new()
            }
        };

        let start_time = self.start_time(pid);

        let container = match self.containers.resolve(pid) {
            Ok(container) => container,
            Err(e) => {
                warn!(pid, error = %e, "container lookup failed");
                None
            }
        };

        debug!(pid, exe = %exe, containerized = container.is_some(), "resolved process facts");
        ProcessFact {
            exe,
            start_time,
            container,
        }
    }

    /// Start time in seconds since epoch: boot time + starttime / CLK_TCK.
    ///
    /// Returns 0 if either the boot time or the process stat is unreadable.
    fn start_time(&mut self, pid: u32) -> f64 {
        let Some(boot_time) = self.boot_time() else {
            return 0.0;
        };
        let stat_path = format!("{}/{}/stat", self.proc_path, pid);
        let starttime = self
            .fs
            .read_to_string(Path::new(&stat_path))
            .map_err(|e| e.to_string())
            .and_then(|content| parse_stat_starttime(&content).map_err(|e| e.to_string()));
        match starttime {
            Ok(ticks) => boot_time as f64 + ticks as f64 / CLK_TCK as f64,
            Err(e) => {
                debug!(pid, error = %e, "cannot read process start time");
                0.0
            }
        }
    }

    /// Boot time, parsed on first use. Failures are retried on the next call.
    fn boot_time(&mut self) -> Option<u64> {
        if self.boot_time.is_none() {
            let stat_path = format!("{}/stat", self.proc_path);
            let parsed = self
                .fs
                .read_to_string(Path::new(&stat_path))
                .map_err(|e| e.to_string())
                .and_then(|content| parse_boot_time(&content).map_err(|e| e.to_string()));
            match parsed {
                Ok(btime) => self.boot_time = Some(btime),
                Err(e) => warn!(error = %e, "cannot determine system boot time"),
            }
        }
        self.boot_time
    }
}
