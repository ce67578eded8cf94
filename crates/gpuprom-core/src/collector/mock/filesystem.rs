//! In-memory mock filesystem for testing collectors without real `/proc`
//! and `/sys`.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory filesystem for testing.
///
/// Stores files and symlinks in memory. Every read is counted, and the
/// counters are shared between clones so a test can keep a handle while the
/// collector owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Map from symlink path to its target.
    links: HashMap<PathBuf, PathBuf>,
    /// Set of directories implied by added files.
    directories: HashSet<PathBuf>,
    reads: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds a symbolic link pointing at `target`.
    pub fn add_link(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.links.insert(path, target.as_ref().to_path_buf());
    }

    /// Removes a file, e.g. to simulate a device losing its AER entries.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    /// Adds a process with the `/proc/[pid]/` files the fact cache reads.
    ///
    /// An empty `cgroup` leaves the file out, like a process that exited
    /// between listing and inspection.
    pub fn add_process(&mut self, pid: u32, exe: &str, stat: &str, cgroup: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_link(base.join("exe"), exe);
        self.add_file(base.join("stat"), stat);
        if !cgroup.is_empty() {
            self.add_file(base.join("cgroup"), cgroup);
        }
    }

    /// Number of `read_to_string` / `read_link` calls made for `path`.
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    fn record_read(&self, path: &Path) {
        *self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
            .or_insert(0) += 1;
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("file not found: {:?}", path),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.record_read(path);
        self.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.record_read(path);
        self.links.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
            || self.links.contains_key(path)
            || self.directories.contains(path)
    }
}
