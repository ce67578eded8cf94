//! PCIe device information: AER error counters from sysfs and vendor names
//! from lspci.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::collector::traits::{CommandRunner, FileSystem};
use crate::model::{BusErrorCounts, VendorInfo};

/// Why one AER counter could not be read.
#[derive(Debug, Error)]
pub enum BusErrorReason {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} has no {key} line", path.display())]
    MissingCounter { path: PathBuf, key: &'static str },
}

/// Maps a driver bus id to its sysfs device directory name.
///
/// nvidia-smi prints an 8-digit domain (`00000000:01:00.0`) while sysfs
/// uses 4 digits (`0000:01:00.0`), so four leading zeros are dropped when
/// present. The result is lower-cased.
pub fn sysfs_bus_address(id: &str) -> String {
    let lower = id.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let eight_digit_domain = bytes.len() > 8
        && bytes[8] == b':'
        && lower.starts_with("0000")
        && bytes[4..8].iter().all(u8::is_ascii_hexdigit);
    if eight_digit_domain {
        lower[4..].to_string()
    } else {
        lower
    }
}

/// Reads AER counters below `<sys>/bus/pci/devices/<addr>/`.
#[derive(Debug, Clone)]
pub struct BusErrorReader<F: FileSystem> {
    fs: F,
    sys_path: String,
}

impl<F: FileSystem> BusErrorReader<F> {
    pub fn new(fs: F, sys_path: impl Into<String>) -> Self {
        Self {
            fs,
            sys_path: sys_path.into(),
        }
    }

    /// Reads all three counters for the GPU with bus id `id`.
    ///
    /// Never fails: every counter that cannot be read is reported as
    /// [`BusErrorCounts::UNKNOWN`].
    pub fn read(&self, id: &str) -> BusErrorCounts {
        let dir = PathBuf::from(format!(
            "{}/bus/pci/devices/{}",
            self.sys_path,
            sysfs_bus_address(id)
        ));
        let collapse = |file: &str, key: &'static str| {
            self.read_counter(&dir.join(file), key).unwrap_or_else(|e| {
                debug!(gpu = id, error = %e, "AER counter unavailable");
                BusErrorCounts::UNKNOWN
            })
        };
        BusErrorCounts {
            fatal: collapse("aer_dev_fatal", "TOTAL_ERR_FATAL"),
            non_fatal: collapse("aer_dev_nonfatal", "TOTAL_ERR_NONFATAL"),
            correctable: collapse("aer_dev_correctable", "TOTAL_ERR_COR"),
        }
    }

    fn read_counter(&self, path: &Path, key: &'static str) -> Result<i64, BusErrorReason> {
        let content = self
            .fs
            .read_to_string(path)
            .map_err(|source| BusErrorReason::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        parse_aer_total(&content, key).ok_or_else(|| BusErrorReason::MissingCounter {
            path: path.to_path_buf(),
            key,
        })
    }
}

/// Finds `<key> <n>` in an `aer_dev_*` file.
fn parse_aer_total(content: &str, key: &str) -> Option<i64> {
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next() == Some(key) {
            parts.next()?.parse().ok()
        } else {
            None
        }
    })
}

/// Why an lspci lookup failed.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("lspci -s {id} failed: {reason}")]
    Failed { id: String, reason: String },
}

/// Resolves and caches PCI vendor names per GPU via `lspci -vmm -s <id>`.
///
/// Vendor names cannot change while the exporter runs, so each GPU is
/// queried once, successful or not.
pub struct VendorResolver<R: CommandRunner> {
    runner: R,
    lspci_path: PathBuf,
    cache: HashMap<String, VendorInfo>,
}

impl<R: CommandRunner> VendorResolver<R> {
    pub fn new(runner: R, lspci_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            lspci_path: lspci_path.into(),
            cache: HashMap::new(),
        }
    }

    /// Vendor names for GPU `id`, empty if lspci could not tell.
    pub fn resolve(&mut self, id: &str) -> VendorInfo {
        if let Some(info) = self.cache.get(id) {
            return info.clone();
        }
        let info = self.query(id).unwrap_or_else(|e| {
            warn!(gpu = id, error = %e, "lspci lookup failed");
            VendorInfo::default()
        });
        self.cache.insert(id.to_string(), info.clone());
        info
    }

    fn query(&self, id: &str) -> Result<VendorInfo, VendorError> {
        let output = self
            .runner
            .run(&self.lspci_path, &["-vmm", "-s", id])
            .map_err(|source| VendorError::Spawn {
                program: self.lspci_path.display().to_string(),
                source,
            })?;
        if !output.success {
            return Err(VendorError::Failed {
                id: id.to_string(),
                reason: output.failure_summary(),
            });
        }
        Ok(parse_lspci_vmm(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses `lspci -vmm` key/value output.
pub fn parse_lspci_vmm(content: &str) -> VendorInfo {
    let mut info = VendorInfo::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Vendor" => info.vendor = value,
            "Device" => info.device = value,
            "SVendor" => info.subsys_vendor = value,
            "SDevice" => info.subsys_device = value,
            _ => {}
        }
    }
    info
}
