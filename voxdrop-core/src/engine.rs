//! The reconciliation loop.
//!
//! One task owns the candidate tracker and the sent log. Watch sources only
//! talk to it through the signal queue, so no state is shared.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::candidates::CandidateTracker;
use crate::config::EngineConfig;
use crate::dedupe::SentLog;
use crate::error::Result;
use crate::fs_watch::{ReloadReason, WatchPlan, WatchService, WatchSignal, sleep_until_opt};
use crate::host::ProjectProbe;
use crate::pipeline::sink::DeliverySink;
use crate::pipeline::{DeliveryPipeline, FlushReport};
use crate::rules::RuleSet;
use crate::transform::Transform;

/// Collaborators injected into an engine.
#[derive(Clone)]
pub struct EngineDeps {
    pub transform: Arc<dyn Transform>,
    pub sink: Arc<dyn DeliverySink>,
    pub probe: Arc<dyn ProjectProbe>,
}

impl fmt::Debug for EngineDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineDeps").finish_non_exhaustive()
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    /// Settings or project changed. The caller rebuilds everything.
    Reload(ReloadReason),
    Shutdown,
}

pub struct Engine {
    config: EngineConfig,
    pipeline: DeliveryPipeline,
    tracker: CandidateTracker,
    sent: SentLog,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("pipeline", &self.pipeline)
            .field("candidates", &self.tracker.len())
            .field("sent", &self.sent.len())
            .finish()
    }
}

impl Engine {
    /// Engine with empty candidate and sent state.
    pub fn new(config: EngineConfig, rules: RuleSet, deps: EngineDeps) -> Self {
        let tracker = CandidateTracker::with_limits(config.max_retry, config.max_stay);
        let sent = SentLog::new(config.resend_window);
        let pipeline = DeliveryPipeline::new(
            Arc::new(rules),
            config.clone(),
            deps.transform,
            deps.sink,
            deps.probe,
        );
        Self {
            config,
            pipeline,
            tracker,
            sent,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        self.pipeline.rules()
    }

    pub fn tracker(&self) -> &CandidateTracker {
        &self.tracker
    }

    pub fn sent_log(&self) -> &SentLog {
        &self.sent
    }

    /// Add a coalesced batch to the tracked candidates.
    pub fn merge(&mut self, batch: Vec<PathBuf>) -> usize {
        let added = self.tracker.merge(batch);
        debug!(added, tracked = self.tracker.len(), "merged batch");
        added
    }

    /// Run one flush cycle now.
    pub async fn flush(&mut self) -> Result<FlushReport> {
        self.pipeline.flush(&mut self.tracker, &mut self.sent).await
    }

    /// Flush and decide when to look again.
    async fn cycle(&mut self) -> Option<Instant> {
        let (delay, waiting) = match self.flush().await {
            Ok(report) => (self.config.recheck_delay, report.needs_recheck()),
            Err(err) => {
                error!(error = %err, "flush cycle aborted");
                (self.config.host_retry_delay, true)
            }
        };
        (waiting && !self.tracker.is_empty()).then(|| Instant::now() + delay)
    }

    /// Consume signals until a reload, cancellation, or all producers are
    /// gone.
    pub async fn run(
        &mut self,
        mut signals: mpsc::Receiver<WatchSignal>,
        cancel: &CancellationToken,
    ) -> RunExit {
        let mut recheck_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RunExit::Shutdown,
                signal = signals.recv() => match signal {
                    None => return RunExit::Shutdown,
                    Some(WatchSignal::Reload(reason)) => {
                        info!(?reason, "reload requested");
                        return RunExit::Reload(reason);
                    }
                    Some(WatchSignal::Batch(paths)) => {
                        self.merge(paths);
                        recheck_at = self.cycle().await;
                    }
                },
                _ = sleep_until_opt(recheck_at) => {
                    debug!(tracked = self.tracker.len(), "rechecking candidates");
                    recheck_at = self.cycle().await;
                }
            }
        }
    }

    /// Start watchers for `plan`, run until the run ends, then tear the
    /// watchers down.
    pub async fn run_watched(
        mut self,
        plan: WatchPlan,
        cancel: &CancellationToken,
    ) -> Result<RunExit> {
        let (tx, rx) = mpsc::channel(self.config.signal_capacity.max(1));
        let run_cancel = cancel.child_token();
        let service = WatchService::start(
            plan,
            &self.config,
            Arc::clone(self.pipeline.probe()),
            tx,
            run_cancel.clone(),
        )?;

        let exit = self.run(rx, &run_cancel).await;
        run_cancel.cancel();
        service.shutdown();
        Ok(exit)
    }
}
