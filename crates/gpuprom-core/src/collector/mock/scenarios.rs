//! Pre-built host scenarios for testing.
//!
//! The scenarios describe one machine with two GPUs as seen through
//! nvidia-smi, `/proc`, `/sys`, docker, lspci and the GDDR6 helper.

use super::filesystem::MockFs;
use super::runner::MockRunner;
use crate::collector::smi::SMI_ARGS;

/// Recorded `nvidia-smi -q -x` output of a two-GPU machine.
///
/// GPU 0 (`00000000:01:00.0`) reports the current power layout and runs
/// pids 1001 and 1002; GPU 1 (`00000000:02:00.0`) has no power block and
/// runs pid 1003.
pub const TWO_GPU_REPORT: &str = include_str!("../../../testdata/two-gpus.xml");

pub const NVIDIA_SMI: &str = "/usr/bin/nvidia-smi";
pub const LSPCI: &str = "/usr/bin/lspci";
pub const GDDR6_HELPER: &str = "/usr/local/bin/gddr6";
pub const CONTAINER_ID: &str = "3f2a9c0d1e7b";

/// The one pid of [`TWO_GPU_REPORT`] that runs inside a container.
pub const CONTAINERIZED_PID: u32 = 1001;

fn stat_line(pid: u32, comm: &str, starttime: u64) -> String {
    format!(
        "{} ({}) S 1 {} {} 0 -1 4194560 5000 0 0 0 1200 300 0 0 20 0 12 0 {} 8000000000 200000 \
         18446744073709551615 1 1 0 0 0 0 0 16781312 17642 0 0 0 17 3 0 0 0 0 0\n",
        pid, comm, pid, pid, starttime
    )
}

#[allow(dead_code)]
impl MockFs {
    /// Host matching [`TWO_GPU_REPORT`].
    ///
    /// Includes: boot time, the three GPU processes (1001 in docker), AER
    /// counters for GPU 0 only, and the GDDR6 helper binary.
    pub fn gpu_host() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        fs.add_process(
            CONTAINERIZED_PID,
            "/usr/bin/python3.11",
            &stat_line(1001, "python3", 250_000),
            &format!(
                "12:pids:/docker/{}\n11:memory:/docker/{}\n",
                CONTAINER_ID, CONTAINER_ID
            ),
        );
        fs.add_process(
            1002,
            "/usr/lib/xorg/Xorg",
            &stat_line(1002, "Xorg", 1_500),
            "0::/system.slice/display-manager.service\n",
        );
        fs.add_process(
            1003,
            "/opt/render/bin/renderd",
            &stat_line(1003, "renderd", 99_950),
            "0::/user.slice/user-1000.slice/session-2.scope\n",
        );

        let aer = "/sys/bus/pci/devices/0000:01:00.0";
        fs.add_file(
            format!("{}/aer_dev_fatal", aer),
            "Undefined 0\nDLP 0\nSDES 0\nTLP 0\nFCP 0\nCmpltTO 0\nTOTAL_ERR_FATAL 0\n",
        );
        fs.add_file(
            format!("{}/aer_dev_nonfatal", aer),
            "Undefined 0\nDLP 0\nCmpltTO 1\nTOTAL_ERR_NONFATAL 1\n",
        );
        fs.add_file(
            format!("{}/aer_dev_correctable", aer),
            "RxErr 0\nBadTLP 3\nBadDLLP 1\nRollover 0\nTimeout 0\nTOTAL_ERR_COR 4\n",
        );

        fs.add_file(GDDR6_HELPER, "");

        fs
    }
}

#[allow(dead_code)]
impl MockRunner {
    /// Commands answering for [`MockFs::gpu_host`].
    ///
    /// lspci only knows GPU 0 and the GDDR6 helper only reports GPU 0.
    pub fn gpu_host() -> Self {
        let mut runner = Self::new();
        runner.on_success(NVIDIA_SMI, &SMI_ARGS, TWO_GPU_REPORT);
        runner.on_success(
            "docker",
            &["inspect", CONTAINER_ID],
            format!(
                r#"[{{"Id": "{}", "Name": "/trainer", "Created": "2024-03-01T12:00:00.25Z",
                     "Config": {{"Image": "pytorch/pytorch:2.2.0-cuda12.1"}}}}]"#,
                CONTAINER_ID
            ),
        );
        runner.on_success(
            LSPCI,
            &["-vmm", "-s", "00000000:01:00.0"],
            "Slot:\t01:00.0\nClass:\tVGA compatible controller\nVendor:\tNVIDIA Corporation\n\
             Device:\tGA102 [GeForce RTX 3090]\nSVendor:\tASUSTeK Computer Inc.\n\
             SDevice:\tDevice 87b3\nRev:\ta1\n",
        );
        runner.on_failure(
            LSPCI,
            &["-vmm", "-s", "00000000:02:00.0"],
            1,
            "lspci: -s: Invalid slot number",
        );
        runner.on_success(
            GDDR6_HELPER,
            &["-j"],
            r#"[{"pci_id": "0000:01:00.0", "temp": 84}]"#,
        );
        runner
    }
}
