//! Delivery pipeline: one flush turns tracked candidates into at most one
//! sink call and updates the candidate and sent-record bookkeeping.
//!
//! Failure classes per candidate:
//! - the wave vanished or the pair is too far apart in time: dropped
//!   silently, a later event recreates it;
//! - the pair does not validate yet (no text, bad header, empty text):
//!   stay counter. Only a structurally incomplete pair holds back the rest
//!   of the batch;
//! - relocation, transform or sink raised: retry counter. File operations
//!   of that attempt are rolled back so the retry sees the original pair;
//! - host or project missing: the whole cycle aborts without touching any
//!   counter.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::candidates::{Candidate, CandidateTracker};
use crate::config::EngineConfig;
use crate::dedupe::{Fingerprint, SentLog};
use crate::error::{EngineError, Result};
use crate::host::{ProjectProbe, ProjectSnapshot};
use crate::rules::{Rule, RuleMatch, RuleSet};
use crate::transform::{Transform, TransformContext};

pub mod relocate;
pub mod sink;

use relocate::{Staging, companion_text, relocate, rename_siblings};
use sink::{DeliveryItem, DeliverySink, Resolution, SortMode};

/// Counts of what one flush did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub evaluated: usize,
    pub delivered: usize,
    /// Ready pairs no rule applied to.
    pub skipped: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub stayed: usize,
    pub failed: usize,
}

impl FlushReport {
    /// Whether some candidate is still waiting and deserves a quick recheck.
    pub fn needs_recheck(&self) -> bool {
        self.stayed > 0 || self.failed > 0
    }
}

enum Readiness {
    Ready(ReadyPair),
    /// Header or stream not valid yet.
    Stay,
    /// Companion text not there yet.
    AwaitingText,
    Duplicate,
    Drop,
}

struct ReadyPair {
    path: PathBuf,
    fingerprint: Fingerprint,
    modified: SystemTime,
    retry: u32,
}

enum Prepared {
    NoRule,
    EmptyText,
    Deliver(Box<DeliveryItem>, Staging),
}

/// Validates, matches, transforms and delivers ready pairs.
pub struct DeliveryPipeline {
    rules: Arc<RuleSet>,
    config: EngineConfig,
    transform: Arc<dyn Transform>,
    sink: Arc<dyn DeliverySink>,
    probe: Arc<dyn ProjectProbe>,
}

impl fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("rules", &self.rules.len())
            .field("sort", &self.config.sort)
            .finish_non_exhaustive()
    }
}

impl DeliveryPipeline {
    pub fn new(
        rules: Arc<RuleSet>,
        config: EngineConfig,
        transform: Arc<dyn Transform>,
        sink: Arc<dyn DeliverySink>,
        probe: Arc<dyn ProjectProbe>,
    ) -> Self {
        Self {
            rules,
            config,
            transform,
            sink,
            probe,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn probe(&self) -> &Arc<dyn ProjectProbe> {
        &self.probe
    }

    /// Run one flush cycle over every tracked candidate.
    ///
    /// Returns [`EngineError::HostUnavailable`] when ready pairs exist but
    /// the host or its project cannot be reached. Counters are untouched in
    /// that case.
    pub async fn flush(
        &self,
        tracker: &mut CandidateTracker,
        sent: &mut SentLog,
    ) -> Result<FlushReport> {
        let now = Instant::now();
        sent.expire(now);

        let mut report = FlushReport::default();
        let mut ready = Vec::new();
        let mut incomplete = 0;
        for candidate in tracker.evaluate() {
            report.evaluated += 1;
            match self.readiness(&candidate, sent, now) {
                Readiness::Ready(pair) => ready.push(pair),
                Readiness::Stay => {
                    tracker.record_stay(&candidate.path);
                    report.stayed += 1;
                    incomplete += 1;
                }
                Readiness::AwaitingText => {
                    tracker.record_stay(&candidate.path);
                    report.stayed += 1;
                }
                Readiness::Duplicate => {
                    debug!(path = %candidate.path.display(), "already delivered, skipping");
                    tracker.remove(&candidate.path);
                    report.duplicates += 1;
                }
                Readiness::Drop => {
                    tracker.remove(&candidate.path);
                    report.dropped += 1;
                }
            }
        }

        if incomplete > 0 {
            // Ready pairs wait for half-written ones so one batch keeps its order.
            debug!(
                ready = ready.len(),
                waiting = incomplete,
                "deferring delivery until pending pairs settle"
            );
            return Ok(report);
        }
        if ready.is_empty() {
            return Ok(report);
        }

        let project = self.project().await?;
        match self.config.sort {
            SortMode::ModDate => ready.sort_by(|a, b| {
                a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path))
            }),
            SortMode::Name => ready.sort_by(|a, b| a.path.cmp(&b.path)),
        }

        let mut items = Vec::with_capacity(ready.len());
        let mut staged = HashMap::with_capacity(ready.len());
        for pair in ready {
            match self.prepare(&pair, tracker.max_retry()) {
                Ok(Prepared::Deliver(item, staging)) => {
                    staged.insert(item.source.clone(), staging);
                    items.push(*item);
                }
                Ok(Prepared::NoRule) => {
                    info!(path = %pair.path.display(), "no rule matched, skipping");
                    sent.record(&pair.path, pair.fingerprint, now);
                    tracker.remove(&pair.path);
                    report.skipped += 1;
                }
                Ok(Prepared::EmptyText) => {
                    debug!(path = %pair.path.display(), "text is still empty");
                    tracker.record_stay(&pair.path);
                    report.stayed += 1;
                }
                Err(err) => {
                    warn!(path = %pair.path.display(), error = %err, "preparing delivery failed");
                    tracker.record_retry(&pair.path);
                    report.failed += 1;
                }
            }
        }

        if items.is_empty() {
            return Ok(report);
        }

        match self.sink.deliver(&items, self.config.sort, &project).await {
            Ok(resolutions) => {
                for resolution in &resolutions {
                    if let Some(staging) = staged.remove(&resolution.source) {
                        staging.commit();
                    }
                    self.settle(resolution, tracker, sent, now);
                    report.delivered += 1;
                }
                for item in &items {
                    if let Some(staging) = staged.remove(&item.source) {
                        warn!(path = %item.source.display(), "sink did not consume item");
                        staging.rollback();
                        tracker.record_retry(&item.source);
                        report.failed += 1;
                    }
                }
                info!(
                    delivered = report.delivered,
                    failed = report.failed,
                    "delivery batch finished"
                );
            }
            Err(err) => {
                error!(items = items.len(), error = %err, "delivery batch failed");
                for item in &items {
                    if let Some(staging) = staged.remove(&item.source) {
                        staging.rollback();
                    }
                    tracker.record_retry(&item.source);
                }
                report.failed += items.len();
            }
        }

        Ok(report)
    }

    async fn project(&self) -> Result<ProjectSnapshot> {
        let probe = Arc::clone(&self.probe);
        let project = tokio::task::spawn_blocking(move || probe.snapshot())
            .await
            .map_err(|err| EngineError::Internal(format!("host probe panicked: {err}")))?
            .map_err(|err| EngineError::HostUnavailable(err.to_string()))?;
        if !project.has_project() {
            return Err(EngineError::HostUnavailable(
                "no project is open in the editing host".to_string(),
            ));
        }
        Ok(project)
    }

    fn readiness(&self, candidate: &Candidate, sent: &SentLog, now: Instant) -> Readiness {
        let wav = &candidate.path;
        let Ok(wav_meta) = fs::metadata(wav) else {
            debug!(path = %wav.display(), "wave file is gone");
            return Readiness::Drop;
        };

        let txt = companion_text(wav);
        let Ok(txt_meta) = fs::metadata(&txt) else {
            if sent.recently_sent(wav, now) {
                debug!(path = %wav.display(), "text removed after delivery");
                return Readiness::Drop;
            }
            debug!(path = %txt.display(), "companion text has not arrived");
            return Readiness::AwaitingText;
        };

        let (Ok(wav_mod), Ok(txt_mod)) = (wav_meta.modified(), txt_meta.modified()) else {
            return Readiness::Drop;
        };
        if let Some(delta) = self.config.delta {
            let gap = wav_mod
                .duration_since(txt_mod)
                .or_else(|_| txt_mod.duration_since(wav_mod))
                .unwrap_or_default();
            if gap > delta {
                debug!(
                    path = %wav.display(),
                    gap_ms = gap.as_millis() as u64,
                    "modification times too far apart"
                );
                return Readiness::Drop;
            }
        }

        let fingerprint = match Fingerprint::compute(wav, &txt) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                debug!(path = %wav.display(), error = %err, "pair is not ready yet");
                return Readiness::Stay;
            }
        };
        if sent.is_duplicate(wav, &fingerprint, now) {
            return Readiness::Duplicate;
        }

        Readiness::Ready(ReadyPair {
            path: wav.clone(),
            fingerprint,
            modified: wav_mod,
            retry: candidate.state.retry,
        })
    }

    fn prepare(&self, pair: &ReadyPair, max_retry: u32) -> Result<Prepared> {
        let Some(RuleMatch { index, rule, text }) = self.rules.find(&pair.path)? else {
            return Ok(Prepared::NoRule);
        };
        if text.is_empty() && !self.config.accept_empty_text {
            return Ok(Prepared::EmptyText);
        }
        info!(path = %pair.path.display(), rule = index + 1, "rule matched");

        let mut staging = Staging::new();
        match self.stage(pair, index, rule, text, max_retry, &mut staging) {
            Ok(item) => Ok(Prepared::Deliver(Box::new(item), staging)),
            Err(err) => {
                staging.rollback();
                Err(err)
            }
        }
    }

    /// Relocate, transform and rename one matched pair, recording every file
    /// operation in `staging`.
    fn stage(
        &self,
        pair: &ReadyPair,
        index: usize,
        rule: &Rule,
        text: String,
        max_retry: u32,
        staging: &mut Staging,
    ) -> Result<DeliveryItem> {
        let mut path = relocate(&pair.path, rule, staging)?;

        let mut ctx = TransformContext::new(path.clone());
        ctx.layer = rule.layer;
        ctx.text = text;
        ctx.padding = rule.padding;
        ctx.user_data = rule.user_data.clone();
        ctx.exo_file = rule.exo_file.clone();
        ctx.lua_file = rule.lua_file.clone();
        if let Some(script) = &rule.modifier {
            ctx = self.transform.apply(script, ctx)?;
            if ctx.renamed() {
                path = rename_siblings(&path, &ctx.filename, staging)?;
                info!(path = %path.display(), "renamed by modifier");
            }
        }
        if rule.delete_text {
            staging.remove_on_commit(companion_text(&path));
        }

        let modified: DateTime<Utc> = pair.modified.into();
        Ok(DeliveryItem {
            source: pair.path.clone(),
            path: std::path::absolute(&path)?,
            fingerprint: pair.fingerprint,
            try_count: pair.retry,
            max_retry,
            modified,
            rule_index: index,
            dir: rule.dir.clone(),
            file: rule.file.source().to_string(),
            encoding: rule.encoding,
            layer: ctx.layer,
            text: ctx.text,
            user_data: ctx.user_data,
            padding: ctx.padding,
            exo_file: ctx.exo_file,
            lua_file: ctx.lua_file,
        })
    }

    fn settle(
        &self,
        resolution: &Resolution,
        tracker: &mut CandidateTracker,
        sent: &mut SentLog,
        now: Instant,
    ) {
        sent.record(&resolution.source, resolution.fingerprint, now);
        tracker.remove(&resolution.source);
        if let Some(dest) = &resolution.dest {
            sent.record(dest, resolution.fingerprint, now);
            tracker.remove(dest);
        }
        info!(
            path = %resolution.source.display(),
            fingerprint = %resolution.fingerprint,
            "delivered"
        );
    }
}
