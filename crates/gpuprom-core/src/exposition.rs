//! Prometheus text exposition of a [`Snapshot`].
//!
//! Output format, one sample per line:
//!
//! ```text
//! nvidiasmi_<name>{label="value",...} <value>
//! ```
//!
//! Label keys are sorted. Every value goes through one [`ValueKind`] and is
//! replaced by `NaN` when the result is not a number, so a single odd
//! vendor string never produces an unparsable line.

use std::collections::BTreeMap;

use crate::model::{GpuRecord, PowerReadings, ProcessFact, Snapshot};
use crate::normalize::ValueKind::{self, ActiveFlag, Digits, Quantity, Raw};

pub const METRIC_PREFIX: &str = "nvidiasmi_";

/// Content type of the rendered text.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

type Labels<'a> = BTreeMap<&'static str, &'a str>;

/// One per-GPU metric read straight from a [`GpuRecord`] field.
pub(crate) struct GpuMetric {
    pub name: &'static str,
    pub kind: ValueKind,
    pub value: fn(&GpuRecord) -> &str,
}

const fn metric(name: &'static str, kind: ValueKind, value: fn(&GpuRecord) -> &str) -> GpuMetric {
    GpuMetric { name, kind, value }
}

/// Per-GPU metrics other than power, AER, vendor and memory junction data.
#[rustfmt::skip]
pub(crate) const GPU_METRICS: &[GpuMetric] = &[
    metric("pci_pcie_gen_max", Raw, |g| g.pci.link.pcie_gen.max.as_str()),
    metric("pci_pcie_gen_current", Raw, |g| g.pci.link.pcie_gen.current.as_str()),
    metric("pci_link_width_max_multiplicator", Digits, |g| g.pci.link.link_widths.max.as_str()),
    metric("pci_link_width_current_multiplicator", Digits, |g| g.pci.link.link_widths.current.as_str()),
    metric("pci_replay_counter", Raw, |g| g.pci.replay_counter.as_str()),
    metric("pci_replay_rollover_counter", Raw, |g| g.pci.replay_rollover_counter.as_str()),
    metric("pci_tx_util_bytes_per_second", Quantity, |g| g.pci.tx_util.as_str()),
    metric("pci_rx_util_bytes_per_second", Quantity, |g| g.pci.rx_util.as_str()),
    metric("fan_speed_percent", Quantity, |g| g.fan_speed.as_str()),
    metric("performance_state_int", Digits, |g| g.performance_state.as_str()),
    metric("fb_memory_usage_total_bytes", Quantity, |g| g.fb_memory.total.as_str()),
    metric("fb_memory_usage_used_bytes", Quantity, |g| g.fb_memory.used.as_str()),
    metric("fb_memory_usage_free_bytes", Quantity, |g| g.fb_memory.free.as_str()),
    metric("bar1_memory_usage_total_bytes", Quantity, |g| g.bar1_memory.total.as_str()),
    metric("bar1_memory_usage_used_bytes", Quantity, |g| g.bar1_memory.used.as_str()),
    metric("bar1_memory_usage_free_bytes", Quantity, |g| g.bar1_memory.free.as_str()),
    metric("utilization_gpu_percent", Quantity, |g| g.utilization.gpu_util.as_str()),
    metric("utilization_memory_percent", Quantity, |g| g.utilization.memory_util.as_str()),
    metric("utilization_encoder_percent", Quantity, |g| g.utilization.encoder_util.as_str()),
    metric("utilization_decoder_percent", Quantity, |g| g.utilization.decoder_util.as_str()),
    metric("encoder_session_count", Raw, |g| g.encoder_stats.session_count.as_str()),
    metric("encoder_average_fps", Raw, |g| g.encoder_stats.average_fps.as_str()),
    metric("encoder_average_latency", Raw, |g| g.encoder_stats.average_latency.as_str()),
    metric("fbc_session_count", Raw, |g| g.fbc_stats.session_count.as_str()),
    metric("fbc_average_fps", Raw, |g| g.fbc_stats.average_fps.as_str()),
    metric("fbc_average_latency", Raw, |g| g.fbc_stats.average_latency.as_str()),
    metric("gpu_temp_celsius", Quantity, |g| g.temperature.gpu_temp.as_str()),
    metric("gpu_temp_max_threshold_celsius", Quantity, |g| g.temperature.gpu_temp_max_threshold.as_str()),
    metric("gpu_temp_slow_threshold_celsius", Quantity, |g| g.temperature.gpu_temp_slow_threshold.as_str()),
    metric("gpu_temp_max_gpu_threshold_celsius", Quantity, |g| g.temperature.gpu_temp_max_gpu_threshold.as_str()),
    metric("gpu_target_temp_celsius", Quantity, |g| g.temperature.gpu_target_temperature.as_str()),
    metric("gpu_target_temp_min_celsius", Quantity, |g| g.target_temperature.min.as_str()),
    metric("gpu_target_temp_max_celsius", Quantity, |g| g.target_temperature.max.as_str()),
    metric("memory_temp_celsius", Quantity, |g| g.temperature.memory_temp.as_str()),
    metric("gpu_temp_max_mem_threshold_celsius", Quantity, |g| g.temperature.gpu_temp_max_mem_threshold.as_str()),
    metric("clock_graphics_hertz", Quantity, |g| g.clocks.graphics_clock.as_str()),
    metric("clock_graphics_max_hertz", Quantity, |g| g.max_clocks.graphics_clock.as_str()),
    metric("clock_sm_hertz", Quantity, |g| g.clocks.sm_clock.as_str()),
    metric("clock_sm_max_hertz", Quantity, |g| g.max_clocks.sm_clock.as_str()),
    metric("clock_mem_hertz", Quantity, |g| g.clocks.mem_clock.as_str()),
    metric("clock_mem_max_hertz", Quantity, |g| g.max_clocks.mem_clock.as_str()),
    metric("clock_video_hertz", Quantity, |g| g.clocks.video_clock.as_str()),
    metric("clock_video_max_hertz", Quantity, |g| g.max_clocks.video_clock.as_str()),
    metric("clock_policy_auto_boost", Quantity, |g| g.clock_policy.auto_boost.as_str()),
    metric("clock_policy_auto_boost_default", Quantity, |g| g.clock_policy.auto_boost_default.as_str()),
    metric("clocks_throttle_reason_gpu_idle", ActiveFlag, |g| g.throttle_reasons.gpu_idle.as_str()),
    metric("clocks_throttle_reason_applications_clocks_setting", ActiveFlag, |g| g.throttle_reasons.applications_clocks_setting.as_str()),
    metric("clocks_throttle_reason_sw_power_cap", ActiveFlag, |g| g.throttle_reasons.sw_power_cap.as_str()),
    metric("clocks_throttle_reason_hw_slowdown", ActiveFlag, |g| g.throttle_reasons.hw_slowdown.as_str()),
    metric("clocks_throttle_reason_hw_thermal_slowdown", ActiveFlag, |g| g.throttle_reasons.hw_thermal_slowdown.as_str()),
    metric("clocks_throttle_reason_hw_power_brake_slowdown", ActiveFlag, |g| g.throttle_reasons.hw_power_brake_slowdown.as_str()),
    metric("clocks_throttle_reason_sync_boost", ActiveFlag, |g| g.throttle_reasons.sync_boost.as_str()),
    metric("clocks_throttle_reason_sw_thermal_slowdown", ActiveFlag, |g| g.throttle_reasons.sw_thermal_slowdown.as_str()),
    metric("clocks_throttle_reason_display_clocks_setting", ActiveFlag, |g| g.throttle_reasons.display_clocks_setting.as_str()),
];

/// Renders the whole snapshot. Never fails.
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = Exposition::default();

    out.sample(
        "driver_version",
        &Labels::new(),
        ValueKind::Version,
        &snapshot.driver_version,
    );
    out.sample(
        "cuda_version",
        &Labels::new(),
        ValueKind::Version,
        &snapshot.cuda_version,
    );
    out.sample(
        "attached_gpus",
        &Labels::new(),
        ValueKind::Raw,
        &snapshot.attached_gpus,
    );
    out.number(
        "snapshot_timestamp_seconds",
        &Labels::new(),
        snapshot.timestamp as f64,
    );

    for gpu in &snapshot.gpus {
        render_gpu(&mut out, snapshot, gpu);
    }

    for (&pid, fact) in &snapshot.processes {
        render_process(&mut out, pid, fact);
    }

    out.text
}

fn gpu_labels(gpu: &GpuRecord) -> Labels<'_> {
    Labels::from([
        ("id", gpu.id.as_str()),
        ("name", gpu.product_name.as_str()),
        ("uuid", gpu.uuid.as_str()),
    ])
}

fn render_gpu(out: &mut Exposition, snapshot: &Snapshot, gpu: &GpuRecord) {
    let labels = gpu_labels(gpu);

    for m in GPU_METRICS {
        out.sample(m.name, &labels, m.kind, (m.value)(gpu));
    }

    for (name, kind, value) in power_metrics(&gpu.power) {
        out.sample(name, &labels, kind, value);
    }

    let errors = snapshot.bus_errors.get(&gpu.id).copied().unwrap_or_default();
    out.number("aer_fatal_count", &labels, errors.fatal as f64);
    out.number("aer_nonfatal_count", &labels, errors.non_fatal as f64);
    out.number("aer_correctable_count", &labels, errors.correctable as f64);

    if let Some(info) = snapshot.vendors.get(&gpu.id) {
        let mut vendor_labels = labels.clone();
        vendor_labels.insert("vendor", &info.vendor);
        vendor_labels.insert("device", &info.device);
        vendor_labels.insert("subsys_vendor", &info.subsys_vendor);
        vendor_labels.insert("subsys_device", &info.subsys_device);
        out.number("pci_vendor_info", &vendor_labels, 1.0);
    }

    if let Some(&temp) = snapshot.memory_temps.get(&gpu.id) {
        out.number("memory_junction_temp_celsius", &labels, temp as f64);
    }

    for process in &gpu.processes {
        let pid = process.pid.to_string();
        let mut process_labels = labels.clone();
        process_labels.insert("process_pid", &pid);
        process_labels.insert("process_type", &process.kind);
        process_labels.insert("process_name", &process.process_name);
        out.sample(
            "process_used_memory_bytes",
            &process_labels,
            ValueKind::Quantity,
            &process.used_memory,
        );
    }
}

/// Power samples of whichever block layout the driver used.
fn power_metrics(power: &PowerReadings) -> Vec<(&'static str, ValueKind, &str)> {
    match power {
        PowerReadings::Current(p) => vec![
            ("power_state_int", Digits, p.power_state.as_str()),
            ("power_draw_watts", Quantity, p.power_draw.as_str()),
            ("current_power_limit_watts", Quantity, p.current_power_limit.as_str()),
            ("requested_power_limit_watts", Quantity, p.requested_power_limit.as_str()),
            ("default_power_limit_watts", Quantity, p.default_power_limit.as_str()),
            ("min_power_limit_watts", Quantity, p.min_power_limit.as_str()),
            ("max_power_limit_watts", Quantity, p.max_power_limit.as_str()),
        ],
        PowerReadings::Legacy(p) => vec![
            ("power_state_int", Digits, p.power_state.as_str()),
            ("power_draw_watts", Quantity, p.power_draw.as_str()),
            ("power_limit_watts", Quantity, p.power_limit.as_str()),
            ("default_power_limit_watts", Quantity, p.default_power_limit.as_str()),
            ("enforced_power_limit_watts", Quantity, p.enforced_power_limit.as_str()),
            ("min_power_limit_watts", Quantity, p.min_power_limit.as_str()),
            ("max_power_limit_watts", Quantity, p.max_power_limit.as_str()),
        ],
        PowerReadings::Absent => Vec::new(),
    }
}

fn render_process(out: &mut Exposition, pid: u32, fact: &ProcessFact) {
    let pid = pid.to_string();
    let mut labels = Labels::from([("pid", pid.as_str()), ("exe", fact.exe.as_str())]);
    if let Some(ref container) = fact.container {
        labels.insert("container_id", &container.id);
        labels.insert("container_name", &container.name);
        labels.insert("docker_image", &container.image);
    }
    out.number("process_info", &labels, 1.0);

    let pid_labels = Labels::from([("pid", pid.as_str())]);
    out.number("process_start_timestamp_seconds", &pid_labels, fact.start_time);

    if let Some(ref container) = fact.container {
        let container_labels =
            Labels::from([("pid", pid.as_str()), ("container_id", container.id.as_str())]);
        out.number(
            "container_start_timestamp_seconds",
            &container_labels,
            container.started_at,
        );
    }
}

/// Accumulates exposition lines.
#[derive(Default)]
struct Exposition {
    text: String,
}

impl Exposition {
    /// Writes a normalized string value.
    fn sample(&mut self, name: &str, labels: &Labels<'_>, kind: ValueKind, raw: &str) {
        let value = kind.apply(raw);
        let value = match value.parse::<f64>() {
            Ok(v) if v.is_finite() => value,
            _ => "NaN".to_string(),
        };
        self.line(name, labels, &value);
    }

    fn number(&mut self, name: &str, labels: &Labels<'_>, value: f64) {
        let value = if value.is_finite() {
            value.to_string()
        } else {
            "NaN".to_string()
        };
        self.line(name, labels, &value);
    }

    fn line(&mut self, name: &str, labels: &Labels<'_>, value: &str) {
        self.text.push_str(METRIC_PREFIX);
        self.text.push_str(name);
        if !labels.is_empty() {
            self.text.push('{');
            for (i, (key, val)) in labels.iter().enumerate() {
                if i > 0 {
                    self.text.push(',');
                }
                self.text.push_str(key);
                self.text.push_str("=\"");
                escape_label_value(&mut self.text, val);
                self.text.push('"');
            }
            self.text.push('}');
        }
        self.text.push(' ');
        self.text.push_str(value);
        self.text.push('\n');
    }
}

fn escape_label_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{GDDR6_HELPER, MockFs, MockRunner, NVIDIA_SMI};
    use crate::collector::{Collector, SmiSource};
    use crate::model::{BusErrorCounts, ContainerIdentity, GpuProcess};
    use std::path::PathBuf;
    use std::sync::Arc;

    const GPU0: &str = "00000000:01:00.0";
    const GPU1: &str = "00000000:02:00.0";

    fn host_snapshot() -> Snapshot {
        let mut collector = Collector::new(
            MockFs::gpu_host(),
            MockRunner::gpu_host(),
            SmiSource::command(NVIDIA_SMI),
        )
        .with_memory_temp_helper(Some(PathBuf::from(GDDR6_HELPER)));
        collector.collect_snapshot().unwrap()
    }

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    fn find<'a>(text: &'a str, prefix: &str) -> Vec<&'a str> {
        text.lines().filter(|l| l.starts_with(prefix)).collect()
    }

    /// Splits a line into (name, label pairs, value).
    fn parse_line(line: &str) -> (String, Vec<(String, String)>, String) {
        let (head, value) = line.rsplit_once(' ').unwrap();
        let Some((name, rest)) = head.split_once('{') else {
            return (head.to_string(), Vec::new(), value.to_string());
        };
        let body = rest.strip_suffix('}').unwrap();
        let mut labels = Vec::new();
        let mut chars = body.chars().peekable();
        while chars.peek().is_some() {
            let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
            assert_eq!(chars.next(), Some('"'));
            let mut val = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next().unwrap() {
                        'n' => val.push('\n'),
                        other => val.push(other),
                    },
                    '"' => break,
                    c => val.push(c),
                }
            }
            labels.push((key, val));
            if chars.peek() == Some(&',') {
                chars.next();
            }
        }
        (name.to_string(), labels, value.to_string())
    }

    fn assert_well_formed(text: &str) {
        for line in text.lines() {
            let (name, labels, value) = parse_line(line);
            assert!(name.starts_with(METRIC_PREFIX), "bad name in {:?}", line);
            assert!(
                value == "NaN" || value.parse::<f64>().is_ok(),
                "bad value in {:?}",
                line
            );
            let keys: Vec<&String> = labels.iter().map(|(k, _)| k).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(keys, sorted, "unsorted labels in {:?}", line);
        }
    }

    #[test]
    fn test_gpu_metric_table() {
        assert_eq!(GPU_METRICS.len(), 54);
        let mut names: Vec<&str> = GPU_METRICS.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), GPU_METRICS.len());
    }

    #[test]
    fn test_end_to_end_line_count() {
        let text = render(&host_snapshot());

        let expected = 4 // globals
            + 2 * GPU_METRICS.len()
            + 7 // power, GPU 0 only
            + 2 * 3 // AER
            + 1 // vendor info, GPU 0 only
            + 1 // memory junction temperature, GPU 0 only
            + 3 // process_used_memory_bytes
            + 3 // process_info
            + 3 // process_start_timestamp_seconds
            + 1; // container_start_timestamp_seconds
        assert_eq!(lines(&text).len(), expected);
        assert_well_formed(&text);
    }

    #[test]
    fn test_end_to_end_values() {
        let text = render(&host_snapshot());

        assert!(text.contains("nvidiasmi_driver_version 535.154\n"));
        assert!(text.contains("nvidiasmi_cuda_version 12.2\n"));
        assert!(text.contains("nvidiasmi_attached_gpus 2\n"));

        let gpu0 = format!(
            "{{id=\"{}\",name=\"NVIDIA GeForce RTX 3090\",uuid=\"GPU-6c5a8b2e-0f0e-4c8c-9d3a-1a2b3c4d5e6f\"}}",
            GPU0
        );
        for (name, value) in [
            ("clocks_throttle_reason_sw_power_cap", "1"),
            ("clocks_throttle_reason_gpu_idle", "0"),
            ("fb_memory_usage_total_bytes", "25769803776"),
            ("power_draw_watts", "301.52"),
            ("current_power_limit_watts", "350"),
            ("power_state_int", "2"),
            ("pci_tx_util_bytes_per_second", "22000000"),
            ("pci_replay_counter", "3"),
            ("pci_link_width_current_multiplicator", "16"),
            ("clock_graphics_hertz", "1695000000"),
            ("gpu_target_temp_max_celsius", "91"),
            ("aer_nonfatal_count", "1"),
            ("aer_correctable_count", "4"),
            ("memory_junction_temp_celsius", "84"),
        ] {
            let line = format!("nvidiasmi_{}{} {}\n", name, gpu0, value);
            assert!(text.contains(&line), "missing {:?}", line);
        }

        // GPU 1 has no power block and no AER files.
        let gpu1_power: Vec<&str> = find(&text, "nvidiasmi_power_draw_watts")
            .into_iter()
            .filter(|l| l.contains(GPU1))
            .collect();
        assert!(gpu1_power.is_empty());
        let gpu1_aer = find(&text, "nvidiasmi_aer_fatal_count")
            .into_iter()
            .find(|l| l.contains(GPU1))
            .unwrap();
        assert!(gpu1_aer.ends_with(" -1"));

        // Clock policy N/A normalizes to 0, not NaN.
        assert!(find(&text, "nvidiasmi_clock_policy_auto_boost{")
            .iter()
            .all(|l| l.ends_with(" 0")));
    }

    #[test]
    fn test_process_info_labels() {
        let text = render(&host_snapshot());
        let info = find(&text, "nvidiasmi_process_info");
        assert_eq!(info.len(), 3);

        let (_, labels, value) = parse_line(info[0]);
        assert_eq!(value, "1");
        let keys: Vec<&str> = labels.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["container_id", "container_name", "docker_image", "exe", "pid"]
        );
        assert_eq!(labels[1].1, "trainer");
        assert_eq!(labels[2].1, "pytorch/pytorch:2.2.0-cuda12.1");

        for line in &info[1..] {
            let (_, labels, _) = parse_line(line);
            let keys: Vec<&str> = labels.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys, vec!["exe", "pid"]);
            assert!(!line.contains("container"));
        }

        assert!(text.contains(
            "nvidiasmi_container_start_timestamp_seconds{container_id=\"3f2a9c0d1e7b\",pid=\"1001\"} 1709294400.25\n"
        ));
        assert!(text.contains("nvidiasmi_process_start_timestamp_seconds{pid=\"1002\"} 1700000015\n"));
    }

    #[test]
    fn test_process_used_memory() {
        let text = render(&host_snapshot());
        let used = find(&text, "nvidiasmi_process_used_memory_bytes");
        assert_eq!(used.len(), 3);

        let (_, labels, value) = parse_line(used[0]);
        let keys: Vec<&str> = labels.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["id", "name", "process_name", "process_pid", "process_type", "uuid"]
        );
        assert_eq!(labels[3].1, "1001");
        assert_eq!(value, "10737418240");
    }

    #[test]
    fn test_bus_error_failure_isolation() {
        let healthy = host_snapshot();
        let mut degraded = healthy.clone();
        degraded
            .bus_errors
            .insert(GPU0.to_string(), BusErrorCounts::unknown());

        let healthy_text = render(&healthy);
        let degraded_text = render(&degraded);
        assert_well_formed(&degraded_text);

        let is_gpu0_aer = |l: &&str| l.contains("_aer_") && l.contains(GPU0);
        let healthy_rest: Vec<&str> = healthy_text.lines().filter(|l| !is_gpu0_aer(l)).collect();
        let degraded_rest: Vec<&str> = degraded_text.lines().filter(|l| !is_gpu0_aer(l)).collect();
        assert_eq!(healthy_rest, degraded_rest);

        let degraded_aer: Vec<&str> = degraded_text.lines().filter(is_gpu0_aer).collect();
        assert_eq!(degraded_aer.len(), 3);
        assert!(degraded_aer.iter().all(|l| l.ends_with(" -1")));
    }

    #[test]
    fn test_render_is_deterministic() {
        let snapshot = host_snapshot();
        assert_eq!(render(&snapshot), render(&snapshot));
    }

    #[test]
    fn test_label_escaping() {
        let gpu = GpuRecord {
            id: "0".into(),
            product_name: "Quadro \"Special\"\nEdition \\ X".into(),
            processes: vec![GpuProcess {
                pid: 7,
                process_name: "C:\\app.exe".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let snapshot = Snapshot {
            gpus: vec![gpu],
            ..Default::default()
        };

        let text = render(&snapshot);
        assert!(text.contains(r#"name="Quadro \"Special\"\nEdition \\ X""#));
        assert!(text.contains(r#"process_name="C:\\app.exe""#));
        assert_well_formed(&text);

        let line = find(&text, "nvidiasmi_fan_speed_percent")[0];
        let (_, labels, _) = parse_line(line);
        assert_eq!(labels[1].1, "Quadro \"Special\"\nEdition \\ X");
    }

    #[test]
    fn test_non_numeric_values_render_nan() {
        let mut gpu = GpuRecord {
            id: "0".into(),
            ..Default::default()
        };
        gpu.pci.replay_counter = "N/A".into();
        gpu.performance_state = "Unknown".into();
        gpu.fan_speed = "N/A".into();
        let snapshot = Snapshot {
            gpus: vec![gpu],
            ..Default::default()
        };

        let text = render(&snapshot);
        assert!(find(&text, "nvidiasmi_pci_replay_counter")[0].ends_with(" NaN"));
        assert!(find(&text, "nvidiasmi_performance_state_int")[0].ends_with(" NaN"));
        // Quantities fall back to 0 instead.
        assert!(find(&text, "nvidiasmi_fan_speed_percent")[0].ends_with(" 0"));
        // Empty driver fields still produce valid globals.
        assert!(text.contains("nvidiasmi_driver_version 0\n"));
        assert!(text.contains("nvidiasmi_attached_gpus NaN\n"));
        assert_well_formed(&text);
    }

    #[test]
    fn test_legacy_power_metrics() {
        let gpu = GpuRecord {
            id: "0".into(),
            power: PowerReadings::Legacy(crate::model::LegacyPowerReadings {
                power_state: "P8".into(),
                power_draw: "15.00 W".into(),
                power_limit: "250.00 W".into(),
                enforced_power_limit: "250.00 W".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let snapshot = Snapshot {
            gpus: vec![gpu],
            ..Default::default()
        };

        let text = render(&snapshot);
        assert!(find(&text, "nvidiasmi_power_limit_watts")[0].ends_with(" 250"));
        assert!(find(&text, "nvidiasmi_enforced_power_limit_watts")[0].ends_with(" 250"));
        assert!(find(&text, "nvidiasmi_power_state_int")[0].ends_with(" 8"));
        assert!(find(&text, "nvidiasmi_current_power_limit_watts").is_empty());
    }

    #[test]
    fn test_container_process_without_gpu_labels() {
        let mut snapshot = Snapshot::default();
        snapshot.processes.insert(
            42,
            Arc::new(ProcessFact {
                exe: "/bin/app".into(),
                start_time: 0.0,
                container: Some(ContainerIdentity {
                    id: "abc".into(),
                    name: "web".into(),
                    image: "nginx".into(),
                    started_at: 0.0,
                }),
            }),
        );

        let text = render(&snapshot);
        assert_eq!(
            find(&text, "nvidiasmi_process_info")[0],
            "nvidiasmi_process_info{container_id=\"abc\",container_name=\"web\",docker_image=\"nginx\",exe=\"/bin/app\",pid=\"42\"} 1"
        );
        assert!(text.contains("nvidiasmi_process_start_timestamp_seconds{pid=\"42\"} 0\n"));
    }
}
