//! Data model shared by the collectors, the store and the formatter.

mod gpu;
mod snapshot;

pub use gpu::{
    ClockPolicy, Clocks, CurrentPowerReadings, EncoderStats, GpuProcess, GpuRecord,
    LegacyPowerReadings, LinkInfo, LinkWidths, MemoryUsage, PciInfo, PcieGen, PowerReadings,
    TargetTemperatureRange, Temperature, ThrottleReasons, Utilization,
};
pub use snapshot::{BusErrorCounts, ContainerIdentity, ProcessFact, Snapshot, VendorInfo};
