//! Per-run scratch space, removed on drop.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::WorkerResult;

/// Temporary directory for one run.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `root` (created if missing).
    pub fn new(root: &Path, prefix: &str) -> WorkerResult<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        debug!("Created scratch dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A uniquely named file guard inside this directory.
    pub fn file(&self, prefix: &str, extension: &str) -> ScratchFile {
        ScratchFile::unique_in(self.path(), prefix, extension)
    }
}

/// A file path that is deleted when the guard drops.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{dir}/{prefix}_{random}.{extension}`
    pub fn unique_in(dir: &Path, prefix: &str, extension: &str) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        let name = format!("{prefix}_{}.{}", &token[..16], extension.trim_start_matches('.'));
        Self::new(dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch file {}: {}", self.path.display(), e),
        }
    }
}
