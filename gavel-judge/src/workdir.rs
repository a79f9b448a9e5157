//! Per-submission scratch directories.
//!
//! Directory creation is serialized by a mutex so the random-name pick and
//! the `mkdir` cannot race between job workers. Removal happens through a
//! scope guard that fires on every exit path, unwinding included.

use gavel_utils::rand_str::rand_alnum;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use tracing::warn;

const NAME_LEN: usize = 6;
const CREATE_ATTEMPTS: usize = 16;

pub struct WorkdirFactory {
    root: PathBuf,
    create_lock: Mutex<()>,
}

impl WorkdirFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_lock: Mutex::new(()),
        }
    }

    /// Remove everything under the root, reclaiming space left behind by a
    /// crashed process. Called once at startup.
    pub fn wipe(&self) {
        if self.root.exists() {
            if let Err(err) = fs::remove_dir_all(&self.root) {
                warn!("failed to wipe workdir root {:?}: {}", self.root, err);
            }
        }
    }

    /// Create a fresh uniquely-named workdir under the root.
    pub fn create(&self) -> Result<Workdir> {
        let _guard = self.create_lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to ensure workdir root {:?}", self.root))?;

        for _ in 0..CREATE_ATTEMPTS {
            let path = self.root.join(rand_alnum(NAME_LEN));
            match fs::create_dir(&path) {
                Ok(()) => return Ok(Workdir { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to create workdir {:?}", path))
                }
            }
        }
        bail!("failed to pick a unique workdir name under {:?}", self.root)
    }
}

/// Owned scratch directory, removed on drop.
pub struct Workdir {
    path: PathBuf,
}

impl Workdir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove workdir {:?}: {}", self.path, err);
            }
        }
    }
}
