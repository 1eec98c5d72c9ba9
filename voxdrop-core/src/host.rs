//! Editing host state as seen by the engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Read-only view of the running editor and its open project.
///
/// Read fresh on every flush and never cached across reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSnapshot {
    /// Native window handle of the editor.
    pub window: u64,
    /// Project frame width. Zero means no project is open.
    pub width: i32,
    pub height: i32,
    pub video_rate: i32,
    pub video_scale: i32,
    pub audio_rate: i32,
    pub audio_channels: i32,
    /// Version of the drop API exposed by the host. Zero predates project
    /// paths.
    pub api_version: i32,
    pub flags: i32,
    pub project_file: Option<PathBuf>,
}

impl ProjectSnapshot {
    pub fn has_project(&self) -> bool {
        self.width != 0
    }

    /// Saved project file, when the host reports one.
    pub fn project_path(&self) -> Option<&Path> {
        if self.api_version < 1 {
            return None;
        }
        self.project_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn fps(&self) -> Option<f64> {
        (self.video_scale != 0).then(|| f64::from(self.video_rate) / f64::from(self.video_scale))
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("editing host not found: {0}")]
    NotFound(String),

    #[error("host state unreadable: {0}")]
    Unreadable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of [`ProjectSnapshot`]s.
///
/// Implemented by the daemon against the host's shared state. Probing is
/// synchronous and expected to be quick.
pub trait ProjectProbe: Send + Sync {
    fn snapshot(&self) -> Result<ProjectSnapshot, ProbeError>;

    /// Currently open project file, `None` when the host or project is
    /// unavailable.
    fn project_path(&self) -> Option<PathBuf> {
        self.snapshot()
            .ok()
            .and_then(|snap| snap.project_path().map(Path::to_path_buf))
    }
}

/// Probe that always answers with the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct StaticProjectProbe {
    snapshot: Option<ProjectSnapshot>,
}

impl StaticProjectProbe {
    pub fn new(snapshot: ProjectSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    /// Probe that reports the host as missing.
    pub fn absent() -> Self {
        Self { snapshot: None }
    }
}

impl ProjectProbe for StaticProjectProbe {
    fn snapshot(&self) -> Result<ProjectSnapshot, ProbeError> {
        self.snapshot
            .clone()
            .ok_or_else(|| ProbeError::NotFound("no host configured".to_string()))
    }
}
