//! Filesystem and host watch sources.
//!
//! notify watchers on every rule directory and on the settings file's
//! directory feed a coalescing task, and a low-frequency poller compares the
//! host's open project against the one captured at startup. Both only
//! produce [`WatchSignal`]s into the queue owned by the engine loop.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod coalescer;
pub mod project_poll;

pub use coalescer::{ChangeCoalescer, ChangeKind};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::host::ProjectProbe;

/// Why the current run should end and settings be read again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadReason {
    SettingsChanged,
    ProjectChanged,
}

/// Message from the watch sources to the engine loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchSignal {
    /// Normalized `.wav` paths that saw qualifying events.
    Batch(Vec<PathBuf>),
    Reload(ReloadReason),
}

pub(crate) enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// What to watch for one engine run.
#[derive(Clone, Debug, Default)]
pub struct WatchPlan {
    /// Rule directories, one per physical directory.
    pub dirs: Vec<PathBuf>,
    pub settings_file: Option<PathBuf>,
    /// Project open when the run started.
    pub project_file: Option<PathBuf>,
}

/// Running watchers and their tasks. Dropping it stops everything.
pub struct WatchService {
    watchers: Vec<RecommendedWatcher>,
    coalesce_task: JoinHandle<()>,
    poll_task: JoinHandle<()>,
}

impl fmt::Debug for WatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchService")
            .field("watcher_count", &self.watchers.len())
            .field("coalesce_finished", &self.coalesce_task.is_finished())
            .field("poll_finished", &self.poll_task.is_finished())
            .finish()
    }
}

impl WatchService {
    /// Attach watchers and spawn the coalescing and polling tasks.
    ///
    /// A rule directory that cannot be watched fails the run. A settings
    /// directory that cannot be watched only disables live reload.
    pub fn start(
        plan: WatchPlan,
        config: &EngineConfig,
        probe: Arc<dyn ProjectProbe>,
        signals: mpsc::Sender<WatchSignal>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let capacity = config.max_batch_events.max(64) * 4;
        let (tx, rx) = mpsc::channel::<WatchMessage>(capacity);

        let mut watchers = Vec::with_capacity(plan.dirs.len() + 1);
        for dir in &plan.dirs {
            watchers.push(watch_dir(dir.clone(), tx.clone())?);
            info!(dir = %dir.display(), "watching");
        }
        if let Some(parent) = plan.settings_file.as_ref().and_then(|p| p.parent()) {
            match watch_dir(parent.to_path_buf(), tx.clone()) {
                Ok(watcher) => watchers.push(watcher),
                Err(err) => warn!(error = %err, "settings changes will not be picked up"),
            }
        }
        drop(tx);

        let coalesce_task = coalescer::spawn_coalesce_loop(
            rx,
            signals.clone(),
            plan.settings_file,
            config.clone(),
            cancel.clone(),
        );
        let poll_task = project_poll::spawn_project_poller(
            probe,
            plan.project_file,
            config.project_poll_interval,
            signals,
            cancel,
        );

        Ok(Self {
            watchers,
            coalesce_task,
            poll_task,
        })
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    pub fn shutdown(self) {
        self.coalesce_task.abort();
        self.poll_task.abort();
        // Dropping `watchers` stops notify streams.
    }
}

fn watch_dir(dir: PathBuf, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let event_dir = dir.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) = tx.blocking_send(WatchMessage::Event(event)) {
                    warn!(dir = %event_dir.display(), error = %err, "watch channel send failed");
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        EngineError::Watch(format!("failed to create watcher for {}: {err}", dir.display()))
    })?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|err| EngineError::Watch(format!("failed to watch {}: {err}", dir.display())))?;
    Ok(watcher)
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
