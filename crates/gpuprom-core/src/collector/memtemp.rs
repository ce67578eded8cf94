//! GDDR6 memory junction temperatures from an optional helper binary.
//!
//! nvidia-smi does not report VRAM junction temperature on consumer cards.
//! A helper (e.g. `gddr6`) run as `<helper> -j` prints
//! `[{"pci_id": "0000:01:00.0", "temp": 84}, ...]`. If the helper is not
//! installed the exporter simply has no memory temperatures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::collector::pcie::sysfs_bus_address;
use crate::collector::traits::{CommandRunner, FileSystem};

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} failed: {reason}")]
    Failed { program: String, reason: String },
    #[error("{program} returned invalid JSON: {source}")]
    Json {
        program: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct HelperEntry {
    pci_id: String,
    temp: i64,
}

/// Runs the memory temperature helper, if it exists.
#[derive(Debug, Clone)]
pub struct MemoryTempReader {
    helper_path: PathBuf,
}

impl MemoryTempReader {
    pub fn new(helper_path: impl Into<PathBuf>) -> Self {
        Self {
            helper_path: helper_path.into(),
        }
    }

    pub fn helper_path(&self) -> &Path {
        &self.helper_path
    }

    /// Temperatures keyed by sysfs bus address (see [`sysfs_bus_address`]).
    ///
    /// `Ok` with an empty map when the helper binary does not exist.
    pub fn read<F: FileSystem, R: CommandRunner>(
        &self,
        fs: &F,
        runner: &R,
    ) -> Result<BTreeMap<String, i64>, HelperError> {
        if !fs.exists(&self.helper_path) {
            return Ok(BTreeMap::new());
        }
        let program = self.helper_path.display().to_string();
        let output = runner
            .run(&self.helper_path, &["-j"])
            .map_err(|source| HelperError::Spawn {
                program: program.clone(),
                source,
            })?;
        if !output.success {
            return Err(HelperError::Failed {
                program,
                reason: output.failure_summary(),
            });
        }
        parse_helper_output(&output.stdout).map_err(|source| HelperError::Json { program, source })
    }
}

/// Parses the helper's JSON array into a bus-address → °C map.
fn parse_helper_output(stdout: &[u8]) -> Result<BTreeMap<String, i64>, serde_json::Error> {
    let entries: Vec<HelperEntry> = serde_json::from_slice(stdout)?;
    Ok(entries
        .into_iter()
        .map(|e| (sysfs_bus_address(&e.pci_id), e.temp))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, MockRunner};

    const HELPER: &str = "/usr/local/bin/gddr6";

    #[test]
    fn test_missing_helper_is_empty() {
        let runner = MockRunner::new();
        let reader = MemoryTempReader::new(HELPER);

        let temps = reader.read(&MockFs::new(), &runner).unwrap();
        assert!(temps.is_empty());
        assert_eq!(runner.call_count(HELPER), 0);
    }

    #[test]
    fn test_read_temperatures() {
        let mut fs = MockFs::new();
        fs.add_file(HELPER, "");
        let mut runner = MockRunner::new();
        runner.on_success(
            HELPER,
            &["-j"],
            r#"[{"pci_id": "0000:01:00.0", "temp": 84}, {"pci_id": "00000000:02:00.0", "temp": 90}]"#,
        );

        let temps = MemoryTempReader::new(HELPER).read(&fs, &runner).unwrap();
        assert_eq!(temps.get("0000:01:00.0"), Some(&84));
        assert_eq!(temps.get("0000:02:00.0"), Some(&90));
    }

    #[test]
    fn test_helper_errors() {
        let mut fs = MockFs::new();
        fs.add_file(HELPER, "");

        let mut runner = MockRunner::new();
        runner.on_failure(HELPER, &["-j"], 2, "no supported GPU");
        let err = MemoryTempReader::new(HELPER).read(&fs, &runner).unwrap_err();
        assert!(matches!(err, HelperError::Failed { .. }));

        let mut runner = MockRunner::new();
        runner.on_success(HELPER, &["-j"], "temp=84");
        let err = MemoryTempReader::new(HELPER).read(&fs, &runner).unwrap_err();
        assert!(matches!(err, HelperError::Json { .. }));
    }
}
