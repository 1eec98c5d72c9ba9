//! Raw notification filtering and debounced batching.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::event::{AccessKind, AccessMode, CreateKind, EventKind, ModifyKind, RenameMode};
use notify::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ReloadReason, WatchMessage, WatchSignal, sleep_until_opt};
use crate::config::EngineConfig;

/// The two notification kinds that can announce new content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
}

/// Map a notify event kind onto [`ChangeKind`]. Renames into a directory
/// count as creation. Attribute-only changes and removals are ignored.
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other) => {
            Some(ChangeKind::Create)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            Some(ChangeKind::Create)
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            Some(ChangeKind::Write)
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(ChangeKind::Write),
        _ => None,
    }
}

/// Paths an event refers to. For a two-sided rename only the new name.
pub fn event_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() > 1 => {
            &event.paths[event.paths.len() - 1..]
        }
        _ => &event.paths,
    }
}

fn tracked_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("txt"))
}

/// Pending set of normalized `.wav` paths.
#[derive(Debug)]
pub struct ChangeCoalescer {
    pending: BTreeSet<PathBuf>,
    freshness: Option<Duration>,
    write_deadline: Duration,
    max_batch_events: usize,
}

impl ChangeCoalescer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pending: BTreeSet::new(),
            freshness: config.freshness,
            write_deadline: config.write_deadline,
            max_batch_events: config.max_batch_events.max(1),
        }
    }

    /// Filter one notification and, when it qualifies, add its `.wav` form
    /// to the pending set. Returns whether it was accepted.
    pub fn offer(&mut self, path: &Path, kind: ChangeKind, now: SystemTime) -> bool {
        if !tracked_extension(path) {
            return false;
        }
        let Ok(modified) = std::fs::metadata(path).and_then(|meta| meta.modified()) else {
            debug!(path = %path.display(), "stat failed, ignoring event");
            return false;
        };
        // Clock skew can put mtime in the future; that counts as fresh.
        let age = now.duration_since(modified).unwrap_or_default();

        match kind {
            ChangeKind::Write if age > self.write_deadline => {
                debug!(path = %path.display(), age_ms = age.as_millis() as u64, "stale write event");
                return false;
            }
            ChangeKind::Create => {
                if let Some(freshness) = self.freshness
                    && age > freshness
                {
                    debug!(path = %path.display(), age_ms = age.as_millis() as u64, "created file is not fresh");
                    return false;
                }
            }
            ChangeKind::Write => {}
        }

        let wav = path.with_extension("wav");
        debug!(path = %wav.display(), ?kind, "candidate event");
        self.pending.insert(wav);
        true
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.max_batch_events
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drain the pending set in path order.
    pub fn take(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

/// Consume notify messages, emitting debounced batches and the settings
/// reload signal. Stops after a reload signal, on cancellation or when the
/// watchers go away.
pub(crate) fn spawn_coalesce_loop(
    mut rx: mpsc::Receiver<WatchMessage>,
    signals: mpsc::Sender<WatchSignal>,
    settings_file: Option<PathBuf>,
    config: EngineConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut coalescer = ChangeCoalescer::new(&config);
        let mut flush_at: Option<Instant> = None;
        let mut reload_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until_opt(reload_at.or(flush_at)) => {
                    if reload_at.is_some() {
                        info!("settings file changed, reloading");
                        let _ = signals.send(WatchSignal::Reload(ReloadReason::SettingsChanged)).await;
                        break;
                    }
                    flush_at = None;
                    if !emit(&mut coalescer, &signals).await {
                        break;
                    }
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        emit(&mut coalescer, &signals).await;
                        break;
                    };
                    match msg {
                        WatchMessage::Event(event) => {
                            let Some(kind) = classify(&event.kind) else {
                                continue;
                            };
                            if let Some(settings) = &settings_file
                                && event.paths.iter().any(|p| p == settings)
                            {
                                debug!(path = %settings.display(), "settings write");
                                reload_at = Some(Instant::now() + config.settings_debounce);
                                continue;
                            }

                            let now = SystemTime::now();
                            let mut accepted = false;
                            for path in event_paths(&event) {
                                accepted |= coalescer.offer(path, kind, now);
                            }
                            if accepted {
                                flush_at = Some(Instant::now() + config.sort_delay);
                            }
                            if coalescer.is_full() && reload_at.is_none() {
                                flush_at = None;
                                if !emit(&mut coalescer, &signals).await {
                                    break;
                                }
                            }
                        }
                        WatchMessage::Error(error) => {
                            warn!(error = %error, "file watcher reported an error");
                        }
                    }
                }
            }
        }
    })
}

async fn emit(coalescer: &mut ChangeCoalescer, signals: &mpsc::Sender<WatchSignal>) -> bool {
    if coalescer.is_empty() {
        return true;
    }
    let batch = coalescer.take();
    debug!(count = batch.len(), "flushing pending events");
    signals.send(WatchSignal::Batch(batch)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind};
    use tempfile::tempdir;

    fn config() -> EngineConfig {
        EngineConfig {
            sort_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_relevant_kinds() {
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Create)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Write)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(ChangeKind::Create)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(classify(&EventKind::Create(CreateKind::Folder)), None);
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), None);
    }

    #[test]
    fn rename_uses_destination_path() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/o/tmp123"))
            .add_path(PathBuf::from("/o/a.wav"));
        assert_eq!(event_paths(&event), [PathBuf::from("/o/a.wav")]);
    }

    #[test]
    fn normalizes_text_events_to_wave_paths() {
        let tmp = tempdir().unwrap();
        let txt = tmp.path().join("a.txt");
        std::fs::write(&txt, b"x").unwrap();

        let mut coalescer = ChangeCoalescer::new(&config());
        assert!(coalescer.offer(&txt, ChangeKind::Create, SystemTime::now()));
        assert_eq!(coalescer.take(), vec![tmp.path().join("a.wav")]);
        assert!(coalescer.is_empty());
    }

    #[test]
    fn filters_extensions_and_missing_files() {
        let tmp = tempdir().unwrap();
        let exo = tmp.path().join("a.exo");
        std::fs::write(&exo, b"x").unwrap();

        let mut coalescer = ChangeCoalescer::new(&config());
        assert!(!coalescer.offer(&exo, ChangeKind::Create, SystemTime::now()));
        assert!(!coalescer.offer(&tmp.path().join("gone.wav"), ChangeKind::Create, SystemTime::now()));
        assert!(coalescer.is_empty());
    }

    #[test]
    fn freshness_and_write_deadline() {
        let tmp = tempdir().unwrap();
        let wav = tmp.path().join("a.wav");
        std::fs::write(&wav, b"x").unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);

        let mut coalescer = ChangeCoalescer::new(&config());
        assert!(!coalescer.offer(&wav, ChangeKind::Create, later));
        assert!(!coalescer.offer(&wav, ChangeKind::Write, later));

        let mut lenient = ChangeCoalescer::new(&EngineConfig {
            freshness: None,
            ..config()
        });
        assert!(lenient.offer(&wav, ChangeKind::Create, later));
        assert!(!lenient.offer(&wav, ChangeKind::Write, later));
    }

    #[test]
    fn extension_case_is_ignored() {
        let tmp = tempdir().unwrap();
        let wav = tmp.path().join("A.WAV");
        std::fs::write(&wav, b"x").unwrap();

        let mut coalescer = ChangeCoalescer::new(&config());
        assert!(coalescer.offer(&wav, ChangeKind::Create, SystemTime::now()));
        assert_eq!(coalescer.take(), vec![tmp.path().join("A.wav")]);
    }

    #[tokio::test]
    async fn loop_debounces_into_one_batch() {
        let tmp = tempdir().unwrap();
        let wav = tmp.path().join("a.wav");
        let txt = tmp.path().join("a.txt");
        std::fs::write(&wav, b"x").unwrap();
        std::fs::write(&txt, b"x").unwrap();

        let (tx, rx) = mpsc::channel(16);
        let (sig_tx, mut sig_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = spawn_coalesce_loop(rx, sig_tx, None, config(), cancel.clone());

        for path in [&wav, &txt, &wav] {
            let event = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
            tx.send(WatchMessage::Event(event)).await.unwrap();
        }

        let signal = sig_rx.recv().await.unwrap();
        assert_eq!(signal, WatchSignal::Batch(vec![wav.clone()]));
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn settings_write_signals_reload() {
        let tmp = tempdir().unwrap();
        let settings = tmp.path().join("setting.toml");
        std::fs::write(&settings, b"").unwrap();

        let (tx, rx) = mpsc::channel(16);
        let (sig_tx, mut sig_rx) = mpsc::channel(16);
        let task = spawn_coalesce_loop(
            rx,
            sig_tx,
            Some(settings.clone()),
            config(),
            CancellationToken::new(),
        );

        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(settings.clone());
        tx.send(WatchMessage::Event(event)).await.unwrap();

        assert_eq!(
            sig_rx.recv().await,
            Some(WatchSignal::Reload(ReloadReason::SettingsChanged))
        );
        task.await.unwrap();
    }

    #[tokio::test]
    async fn full_pending_set_flushes_early() {
        let tmp = tempdir().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let (sig_tx, mut sig_rx) = mpsc::channel(16);
        let cfg = EngineConfig {
            sort_delay: Duration::from_secs(3600),
            max_batch_events: 2,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let task = spawn_coalesce_loop(rx, sig_tx, None, cfg, cancel.clone());

        for stem in ["a", "b"] {
            let wav = tmp.path().join(format!("{stem}.wav"));
            std::fs::write(&wav, b"x").unwrap();
            let event = Event::new(EventKind::Create(CreateKind::File)).add_path(wav);
            tx.send(WatchMessage::Event(event)).await.unwrap();
        }

        match sig_rx.recv().await {
            Some(WatchSignal::Batch(batch)) => assert_eq!(batch.len(), 2),
            other => panic!("unexpected signal {other:?}"),
        }
        cancel.cancel();
        task.await.unwrap();
    }
}
