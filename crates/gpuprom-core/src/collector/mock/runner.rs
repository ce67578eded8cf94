//! Scripted command runner for testing collectors without real binaries.

use crate::collector::traits::{CommandOutput, CommandRunner};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Canned response for one command line.
#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    SpawnError,
}

/// Command runner that answers from a table of scripted responses.
///
/// Commands are keyed by program path plus arguments. Unscripted commands
/// fail to spawn with `NotFound`, like a missing binary. The call log is
/// shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    responses: HashMap<(PathBuf, Vec<String>), Response>,
    calls: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful run printing `stdout`.
    pub fn on_success(
        &mut self,
        program: impl AsRef<Path>,
        args: &[&str],
        stdout: impl Into<Vec<u8>>,
    ) {
        self.insert(
            program,
            args,
            Response::Output(CommandOutput {
                success: true,
                code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            }),
        );
    }

    /// Scripts a run that exits with `code` and prints `stderr`.
    pub fn on_failure(
        &mut self,
        program: impl AsRef<Path>,
        args: &[&str],
        code: i32,
        stderr: &str,
    ) {
        self.insert(
            program,
            args,
            Response::Output(CommandOutput {
                success: false,
                code: Some(code),
                stdout: Vec::new(),
                stderr: stderr.to_string(),
            }),
        );
    }

    /// Scripts a program that cannot be started at all.
    pub fn on_spawn_error(&mut self, program: impl AsRef<Path>, args: &[&str]) {
        self.insert(program, args, Response::SpawnError);
    }

    /// Number of times `program` was invoked, with any arguments.
    pub fn call_count(&self, program: impl AsRef<Path>) -> usize {
        let program = program.as_ref();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(p, _)| p == program)
            .count()
    }

    /// All invocations so far, in order.
    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn insert(&mut self, program: impl AsRef<Path>, args: &[&str], response: Response) {
        let key = (
            program.as_ref().to_path_buf(),
            args.iter().map(|a| a.to_string()).collect(),
        );
        self.responses.insert(key, response);
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput> {
        let key = (
            program.to_path_buf(),
            args.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
        );
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());

        match self.responses.get(&key) {
            Some(Response::Output(output)) => Ok(output.clone()),
            Some(Response::SpawnError) | None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such program: {:?}", program),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_scripted_output() {
        let mut runner = MockRunner::new();
        runner.on_success("/usr/bin/tool", &["-j"], "[]");

        let output = runner.run(Path::new("/usr/bin/tool"), &["-j"]).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, b"[]");

        // Different arguments are a different command.
        assert!(runner.run(Path::new("/usr/bin/tool"), &["-x"]).is_err());
        assert_eq!(runner.call_count("/usr/bin/tool"), 2);
    }

    #[test]
    fn test_mock_runner_failure() {
        let mut runner = MockRunner::new();
        runner.on_failure("docker", &["inspect", "abc"], 1, "No such object");

        let output = runner.run(Path::new("docker"), &["inspect", "abc"]).unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(1));
        assert_eq!(output.stderr, "No such object");
    }
}
