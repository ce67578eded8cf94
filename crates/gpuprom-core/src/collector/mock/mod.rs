//! Test doubles for the filesystem and external commands.

mod filesystem;
mod runner;
mod scenarios;

pub use filesystem::MockFs;
pub use runner::MockRunner;
pub use scenarios::{
    CONTAINER_ID, CONTAINERIZED_PID, GDDR6_HELPER, LSPCI, NVIDIA_SMI, TWO_GPU_REPORT,
};
