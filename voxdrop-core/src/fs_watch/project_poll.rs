//! Host project poller: signals a reload when the open project changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ReloadReason, WatchSignal};
use crate::host::ProjectProbe;

/// Poll the host every `interval` and signal a reload once its open project
/// differs from `initial`.
pub(crate) fn spawn_project_poller(
    probe: Arc<dyn ProjectProbe>,
    initial: Option<PathBuf>,
    interval: Duration,
    signals: mpsc::Sender<WatchSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let probe = Arc::clone(&probe);
            let current = match tokio::task::spawn_blocking(move || probe.project_path()).await {
                Ok(current) => current,
                Err(err) => {
                    warn!(error = %err, "project probe panicked");
                    continue;
                }
            };
            if current == initial {
                debug!("project unchanged");
                continue;
            }

            info!(
                old = ?initial.as_deref().map(|p| p.display().to_string()),
                new = ?current.as_deref().map(|p| p.display().to_string()),
                "project changed, reloading"
            );
            let _ = signals
                .send(WatchSignal::Reload(ReloadReason::ProjectChanged))
                .await;
            break;
        }
    })
}
