//! Host probe backed by a JSON snapshot document.
//!
//! The host side (or a bridge plugin) rewrites the document whenever its
//! state changes. An absent document means no host is running.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use voxdrop_core::host::{ProbeError, ProjectProbe, ProjectSnapshot};

#[derive(Debug, Clone)]
pub struct SnapshotFileProbe {
    path: PathBuf,
}

impl SnapshotFileProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectProbe for SnapshotFileProbe {
    fn snapshot(&self) -> Result<ProjectSnapshot, ProbeError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ProbeError::NotFound(format!(
                    "no host snapshot at {}",
                    self.path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&raw)
            .map_err(|err| ProbeError::Unreadable(format!("{}: {err}", self.path.display())))
    }
}
