//! nvidia-smi XML source.
//!
//! Runs `nvidia-smi -q -x` (or reads a recorded fixture in test mode) and
//! parses the document into [`GpuRecord`]s. Tags the exporter does not
//! render (MIG, ECC, retired pages, application clocks, ...) are ignored.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::collector::traits::{CommandRunner, FileSystem};
use crate::model::{
    ClockPolicy, Clocks, CurrentPowerReadings, EncoderStats, GpuProcess, GpuRecord,
    LegacyPowerReadings, MemoryUsage, PciInfo, PowerReadings, TargetTemperatureRange, Temperature,
    ThrottleReasons, Utilization,
};

/// Arguments that make nvidia-smi print its full XML report.
pub const SMI_ARGS: [&str; 2] = ["-q", "-x"];

/// Failure to obtain a usable GPU report. Either one aborts the cycle.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The tool could not run, exited non-zero, or the fixture is unreadable.
    #[error("GPU query source unavailable: {0}")]
    Unavailable(String),
    /// The output is not a well-formed report.
    #[error("GPU query output malformed: {0}")]
    Malformed(String),
}

/// Where the XML report comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmiSource {
    /// Run the nvidia-smi binary at `path`.
    Command { path: PathBuf },
    /// Read a recorded report from disk (test mode).
    Fixture { path: PathBuf },
}

impl SmiSource {
    pub const DEFAULT_PATH: &'static str = "/usr/bin/nvidia-smi";

    pub fn command(path: impl Into<PathBuf>) -> Self {
        SmiSource::Command { path: path.into() }
    }

    pub fn fixture(path: impl Into<PathBuf>) -> Self {
        SmiSource::Fixture { path: path.into() }
    }

    pub fn is_fixture(&self) -> bool {
        matches!(self, SmiSource::Fixture { .. })
    }

    /// Fetches and parses one report.
    pub fn read<F: FileSystem, R: CommandRunner>(
        &self,
        fs: &F,
        runner: &R,
    ) -> Result<SmiReport, SourceError> {
        let raw = match self {
            SmiSource::Command { path } => run_smi(runner, path)?,
            SmiSource::Fixture { path } => fs.read_to_string(path).map_err(|e| {
                SourceError::Unavailable(format!("cannot read {}: {}", path.display(), e))
            })?,
        };
        parse_report(&raw)
    }
}

impl Default for SmiSource {
    fn default() -> Self {
        SmiSource::command(Self::DEFAULT_PATH)
    }
}

fn run_smi<R: CommandRunner>(runner: &R, path: &Path) -> Result<String, SourceError> {
    let output = runner.run(path, &SMI_ARGS).map_err(|e| {
        SourceError::Unavailable(format!("failed to execute {}: {}", path.display(), e))
    })?;
    if !output.success {
        return Err(SourceError::Unavailable(format!(
            "{} failed: {}",
            path.display(),
            output.failure_summary()
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| SourceError::Malformed(format!("output is not UTF-8: {}", e)))
}

/// Parsed report: global fields plus GPUs in driver order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmiReport {
    pub driver_version: String,
    pub cuda_version: String,
    pub attached_gpus: String,
    pub gpus: Vec<GpuRecord>,
}

/// Parses a `nvidia-smi -q -x` document.
pub fn parse_report(xml: &str) -> Result<SmiReport, SourceError> {
    let log: XmlLog =
        quick_xml::de::from_str(xml).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(SmiReport {
        driver_version: log.driver_version,
        cuda_version: log.cuda_version,
        attached_gpus: log.attached_gpus,
        gpus: log.gpus.into_iter().map(GpuRecord::from).collect(),
    })
}

/// Root `<nvidia_smi_log>` element.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlLog {
    driver_version: String,
    cuda_version: String,
    attached_gpus: String,
    #[serde(rename = "gpu")]
    gpus: Vec<XmlGpu>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlGpu {
    #[serde(rename = "@id")]
    id: String,
    product_name: String,
    product_brand: String,
    uuid: String,
    pci: PciInfo,
    fan_speed: String,
    performance_state: String,
    #[serde(rename = "clocks_throttle_reasons", alias = "clocks_event_reasons")]
    throttle_reasons: ThrottleReasons,
    fb_memory_usage: MemoryUsage,
    bar1_memory_usage: MemoryUsage,
    utilization: Utilization,
    encoder_stats: EncoderStats,
    fbc_stats: EncoderStats,
    temperature: Temperature,
    supported_gpu_target_temp: TargetTemperatureRange,
    power_readings: LegacyPowerReadings,
    gpu_power_readings: CurrentPowerReadings,
    clocks: Clocks,
    max_clocks: Clocks,
    clock_policy: ClockPolicy,
    processes: XmlProcesses,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlProcesses {
    #[serde(rename = "process_info")]
    entries: Vec<GpuProcess>,
}

impl From<XmlGpu> for GpuRecord {
    fn from(gpu: XmlGpu) -> Self {
        GpuRecord {
            id: gpu.id,
            product_name: gpu.product_name,
            product_brand: gpu.product_brand,
            uuid: gpu.uuid,
            pci: gpu.pci,
            fan_speed: gpu.fan_speed,
            performance_state: gpu.performance_state,
            throttle_reasons: gpu.throttle_reasons,
            fb_memory: gpu.fb_memory_usage,
            bar1_memory: gpu.bar1_memory_usage,
            utilization: gpu.utilization,
            encoder_stats: gpu.encoder_stats,
            fbc_stats: gpu.fbc_stats,
            temperature: gpu.temperature,
            target_temperature: gpu.supported_gpu_target_temp,
            power: PowerReadings::resolve(gpu.gpu_power_readings, gpu.power_readings),
            clocks: gpu.clocks,
            max_clocks: gpu.max_clocks,
            clock_policy: gpu.clock_policy,
            processes: gpu.processes.entries,
        }
    }
}
