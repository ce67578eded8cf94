//! Docker container identity of a process.
//!
//! The container id comes from the process's cgroup membership; name, image
//! and creation time come from `docker inspect`.

use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::collector::procfs::parse_docker_container_id;
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::model::ContainerIdentity;

/// Why a container lookup produced nothing usable.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("docker inspect {id} failed: {reason}")]
    Inspect { id: String, reason: String },
    #[error("docker inspect {id} returned invalid JSON: {source}")]
    Json {
        id: String,
        source: serde_json::Error,
    },
    #[error("docker inspect {id} returned no objects")]
    Empty { id: String },
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Created", default)]
    created: String,
    #[serde(rename = "Config", default)]
    config: InspectConfig,
}

#[derive(Debug, Default, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image", default)]
    image: String,
}

/// Resolves pids to the docker container they run in.
#[derive(Debug, Clone)]
pub struct ContainerResolver<F: FileSystem, R: CommandRunner> {
    fs: F,
    runner: R,
    proc_path: String,
    docker_path: PathBuf,
}

impl<F: FileSystem, R: CommandRunner> ContainerResolver<F, R> {
    /// Default docker CLI, looked up in `PATH`.
    pub const DEFAULT_DOCKER: &'static str = "docker";

    pub fn new(fs: F, runner: R, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            runner,
            proc_path: proc_path.into(),
            docker_path: PathBuf::from(Self::DEFAULT_DOCKER),
        }
    }

    /// Uses a specific docker CLI binary.
    pub fn with_docker(mut self, docker_path: impl Into<PathBuf>) -> Self {
        self.docker_path = docker_path.into();
        self
    }

    /// Looks up the container of `pid`.
    ///
    /// `Ok(None)` means the process is not containerized, or its cgroup
    /// file is gone. Errors only come from the runtime query.
    pub fn resolve(&self, pid: u32) -> Result<Option<ContainerIdentity>, ContainerError> {
        let cgroup_path = format!("{}/{}/cgroup", self.proc_path, pid);
        let Ok(cgroup) = self.fs.read_to_string(Path::new(&cgroup_path)) else {
            return Ok(None);
        };
        let Some(id) = parse_docker_container_id(&cgroup) else {
            return Ok(None);
        };
        self.inspect(&id).map(Some)
    }

    fn inspect(&self, id: &str) -> Result<ContainerIdentity, ContainerError> {
        let output = self
            .runner
            .run(&self.docker_path, &["inspect", id])
            .map_err(|source| ContainerError::Spawn {
                program: self.docker_path.display().to_string(),
                source,
            })?;
        if !output.success {
            return Err(ContainerError::Inspect {
                id: id.to_string(),
                reason: output.failure_summary(),
            });
        }
        parse_inspect_output(id, &output.stdout)
    }
}

/// Parses the JSON array printed by `docker inspect <id>`.
pub fn parse_inspect_output(id: &str, stdout: &[u8]) -> Result<ContainerIdentity, ContainerError> {
    let entries: Vec<InspectEntry> =
        serde_json::from_slice(stdout).map_err(|source| ContainerError::Json {
            id: id.to_string(),
            source,
        })?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| ContainerError::Empty { id: id.to_string() })?;

    Ok(ContainerIdentity {
        id: id.to_string(),
        name: entry.name.trim_start_matches('/').to_string(),
        image: entry.config.image,
        started_at: parse_rfc3339_seconds(&entry.created),
    })
}

/// RFC3339 (nanosecond precision allowed) to fractional epoch seconds,
/// 0 when unparsable.
fn parse_rfc3339_seconds(value: &str) -> f64 {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9)
        .unwrap_or(0.0)
}
