//! Load, run, reload.
//!
//! Every run starts from scratch: settings are read again, a new engine is
//! built with empty candidate and sent state, and watchers are re-attached.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use voxdrop_config::{ConfigLoad, ConfigLoader, SettingsSource, log_summary};
use voxdrop_core::engine::{Engine, EngineDeps, RunExit};
use voxdrop_core::fs_watch::WatchPlan;
use voxdrop_core::host::ProjectProbe;
use voxdrop_core::pipeline::sink::DeliverySink;
use voxdrop_core::transform::LuaTransform;

/// Wait before trying again after a run could not start.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

pub struct Supervisor {
    loader: ConfigLoader,
    probe: Arc<dyn ProjectProbe>,
    sink: Arc<dyn DeliverySink>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(
        loader: ConfigLoader,
        probe: Arc<dyn ProjectProbe>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            loader,
            probe,
            sink,
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut generation: u64 = 0;
        loop {
            generation += 1;
            info!(generation, settings = %self.loader.path().display(), "starting run");

            match self.run_once(&cancel).await {
                Ok(RunExit::Shutdown) => break,
                Ok(RunExit::Reload(reason)) => {
                    info!(?reason, "reloading settings");
                }
                Err(err) => {
                    error!(error = ?err, "run failed, retrying in {}s", RETRY_DELAY.as_secs());
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }
        info!("stopped");
    }

    async fn run_once(&self, cancel: &CancellationToken) -> anyhow::Result<RunExit> {
        let probe = Arc::clone(&self.probe);
        let snapshot = tokio::task::spawn_blocking(move || probe.snapshot())
            .await
            .context("host probe panicked")?;
        let project_file = snapshot
            .as_ref()
            .ok()
            .and_then(|snap| snap.project_path())
            .map(Path::to_path_buf);

        let ConfigLoad { settings, source } = self
            .loader
            .load(project_file.as_deref())
            .context("failed to load settings")?;
        if let SettingsSource::File(path) = &source {
            info!(path = %path.display(), "settings loaded");
            log_summary(&settings, &snapshot);
        }

        let plan = WatchPlan {
            dirs: settings.rules.watch_dirs(),
            settings_file: Some(self.loader.path().to_path_buf()),
            project_file,
        };
        let deps = EngineDeps {
            transform: Arc::new(LuaTransform),
            sink: Arc::clone(&self.sink),
            probe: Arc::clone(&self.probe),
        };
        let engine = Engine::new(settings.engine, settings.rules, deps);

        engine
            .run_watched(plan, cancel)
            .await
            .context("failed to watch directories")
    }
}
