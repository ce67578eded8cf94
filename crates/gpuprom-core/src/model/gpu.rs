//! Per-GPU records as reported by `nvidia-smi -q -x`.
//!
//! Measurement groups keep the raw strings from the XML; normalization
//! happens at render time. The group structs double as the XML schema, so
//! every field defaults to an empty string when the element is missing.

use serde::Deserialize;

/// One GPU with all of its measurement groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuRecord {
    /// PCI bus address as printed by the driver (`00000000:01:00.0`).
    pub id: String,
    pub product_name: String,
    pub product_brand: String,
    pub uuid: String,
    pub pci: PciInfo,
    pub fan_speed: String,
    pub performance_state: String,
    pub throttle_reasons: ThrottleReasons,
    pub fb_memory: MemoryUsage,
    pub bar1_memory: MemoryUsage,
    pub utilization: Utilization,
    pub encoder_stats: EncoderStats,
    pub fbc_stats: EncoderStats,
    pub temperature: Temperature,
    pub target_temperature: TargetTemperatureRange,
    pub power: PowerReadings,
    pub clocks: Clocks,
    pub max_clocks: Clocks,
    pub clock_policy: ClockPolicy,
    pub processes: Vec<GpuProcess>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PciInfo {
    #[serde(rename = "pci_gpu_link_info")]
    pub link: LinkInfo,
    pub replay_counter: String,
    pub replay_rollover_counter: String,
    pub tx_util: String,
    pub rx_util: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkInfo {
    pub pcie_gen: PcieGen,
    pub link_widths: LinkWidths,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PcieGen {
    #[serde(rename = "max_link_gen")]
    pub max: String,
    #[serde(rename = "current_link_gen")]
    pub current: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkWidths {
    #[serde(rename = "max_link_width")]
    pub max: String,
    #[serde(rename = "current_link_width")]
    pub current: String,
}

/// Clock throttle reasons. Newer drivers call them "clock event reasons".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThrottleReasons {
    #[serde(
        rename = "clocks_throttle_reason_gpu_idle",
        alias = "clocks_event_reason_gpu_idle"
    )]
    pub gpu_idle: String,
    #[serde(
        rename = "clocks_throttle_reason_applications_clocks_setting",
        alias = "clocks_event_reason_applications_clocks_setting"
    )]
    pub applications_clocks_setting: String,
    #[serde(
        rename = "clocks_throttle_reason_sw_power_cap",
        alias = "clocks_event_reason_sw_power_cap"
    )]
    pub sw_power_cap: String,
    #[serde(
        rename = "clocks_throttle_reason_hw_slowdown",
        alias = "clocks_event_reason_hw_slowdown"
    )]
    pub hw_slowdown: String,
    #[serde(
        rename = "clocks_throttle_reason_hw_thermal_slowdown",
        alias = "clocks_event_reason_hw_thermal_slowdown"
    )]
    pub hw_thermal_slowdown: String,
    #[serde(
        rename = "clocks_throttle_reason_hw_power_brake_slowdown",
        alias = "clocks_event_reason_hw_power_brake_slowdown"
    )]
    pub hw_power_brake_slowdown: String,
    #[serde(
        rename = "clocks_throttle_reason_sync_boost",
        alias = "clocks_event_reason_sync_boost"
    )]
    pub sync_boost: String,
    #[serde(
        rename = "clocks_throttle_reason_sw_thermal_slowdown",
        alias = "clocks_event_reason_sw_thermal_slowdown"
    )]
    pub sw_thermal_slowdown: String,
    #[serde(
        rename = "clocks_throttle_reason_display_clocks_setting",
        alias = "clocks_event_reason_display_clocks_setting"
    )]
    pub display_clocks_setting: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryUsage {
    pub total: String,
    pub used: String,
    pub free: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Utilization {
    pub gpu_util: String,
    pub memory_util: String,
    pub encoder_util: String,
    pub decoder_util: String,
}

/// Session statistics, shared by the encoder and FBC blocks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncoderStats {
    pub session_count: String,
    pub average_fps: String,
    pub average_latency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Temperature {
    pub gpu_temp: String,
    pub gpu_temp_max_threshold: String,
    pub gpu_temp_slow_threshold: String,
    pub gpu_temp_max_gpu_threshold: String,
    pub gpu_target_temperature: String,
    pub memory_temp: String,
    pub gpu_temp_max_mem_threshold: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TargetTemperatureRange {
    #[serde(rename = "gpu_target_temp_min")]
    pub min: String,
    #[serde(rename = "gpu_target_temp_max")]
    pub max: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Clocks {
    pub graphics_clock: String,
    pub sm_clock: String,
    pub mem_clock: String,
    pub video_clock: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClockPolicy {
    pub auto_boost: String,
    pub auto_boost_default: String,
}

/// `<gpu_power_readings>` block of current drivers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurrentPowerReadings {
    pub power_state: String,
    pub power_draw: String,
    pub current_power_limit: String,
    pub requested_power_limit: String,
    pub default_power_limit: String,
    pub min_power_limit: String,
    pub max_power_limit: String,
}

/// `<power_readings>` block of older drivers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LegacyPowerReadings {
    pub power_state: String,
    pub power_management: String,
    pub power_draw: String,
    pub power_limit: String,
    pub default_power_limit: String,
    pub enforced_power_limit: String,
    pub min_power_limit: String,
    pub max_power_limit: String,
}

/// Power block layout, decided once while parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PowerReadings {
    Current(CurrentPowerReadings),
    Legacy(LegacyPowerReadings),
    #[default]
    Absent,
}

impl PowerReadings {
    /// Picks the block whose `power_state` is populated, preferring the
    /// current layout when a driver emits both.
    pub fn resolve(current: CurrentPowerReadings, legacy: LegacyPowerReadings) -> Self {
        if !current.power_state.is_empty() {
            PowerReadings::Current(current)
        } else if !legacy.power_state.is_empty() {
            PowerReadings::Legacy(legacy)
        } else {
            PowerReadings::Absent
        }
    }
}

/// A process holding GPU memory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GpuProcess {
    pub pid: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub process_name: String,
    pub used_memory: String,
}
