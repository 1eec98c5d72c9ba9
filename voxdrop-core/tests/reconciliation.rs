use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voxdrop_core::EngineConfig;
use voxdrop_core::engine::{Engine, EngineDeps, RunExit};
use voxdrop_core::fs_watch::{ReloadReason, WatchSignal};
use voxdrop_core::host::{ProjectSnapshot, StaticProjectProbe};
use voxdrop_core::pipeline::sink::{DeliveryItem, DeliverySink, Resolution, SinkError, SortMode};
use voxdrop_core::rules::encoding::encode_shift_jis;
use voxdrop_core::rules::{FileMove, FilePattern, Rule, RuleSet};
use voxdrop_core::transform::LuaTransform;

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<Vec<DeliveryItem>>>,
    reject: bool,
}

impl RecordingSink {
    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Vec<DeliveryItem>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(
        &self,
        items: &[DeliveryItem],
        _sort: SortMode,
        _project: &ProjectSnapshot,
    ) -> Result<Vec<Resolution>, SinkError> {
        self.calls.lock().unwrap().push(items.to_vec());
        if self.reject {
            return Err(SinkError::Rejected("host busy".into()));
        }
        Ok(items.iter().map(Resolution::delivered).collect())
    }
}

fn host() -> StaticProjectProbe {
    StaticProjectProbe::new(ProjectSnapshot {
        window: 1,
        width: 1920,
        height: 1080,
        video_rate: 30,
        video_scale: 1,
        audio_rate: 44_100,
        audio_channels: 2,
        api_version: 1,
        project_file: Some(PathBuf::from("/work/show.aup")),
        ..Default::default()
    })
}

fn engine(rules: Vec<Rule>, sink: Arc<RecordingSink>) -> Engine {
    let deps = EngineDeps {
        transform: Arc::new(LuaTransform),
        sink,
        probe: Arc::new(host()),
    };
    Engine::new(EngineConfig::default(), RuleSet::new(rules), deps)
}

fn wav_rule(dir: &Path) -> Rule {
    Rule::new(dir, FilePattern::wildcard("*.wav").unwrap())
}

/// 1 second of 44.1kHz 16-bit mono silence.
fn write_wave(path: &Path) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..44_100 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn write_pair(dir: &Path, stem: &str, text: &str) -> PathBuf {
    let wav = dir.join(format!("{stem}.wav"));
    write_wave(&wav);
    std::fs::write(dir.join(format!("{stem}.txt")), encode_shift_jis(text).unwrap()).unwrap();
    wav
}

fn setup() -> (TempDir, Arc<RecordingSink>) {
    (tempdir().unwrap(), Arc::new(RecordingSink::default()))
}

#[tokio::test]
async fn fresh_pair_is_delivered_once() {
    let (tmp, sink) = setup();
    let mut engine = engine(vec![wav_rule(tmp.path())], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");

    engine.merge(vec![wav.clone()]);
    let report = engine.flush().await.unwrap();

    assert_eq!(report.delivered, 1);
    let calls = sink.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    let item = &calls[0][0];
    assert_eq!(item.text, "こんにちは");
    assert_eq!(item.layer, 1);
    assert_eq!(item.source, wav);
    assert!(item.path.is_absolute());
    assert!(engine.tracker().is_empty());
}

#[tokio::test]
async fn identical_rewrite_within_window_is_suppressed() {
    let (tmp, sink) = setup();
    let mut engine = engine(vec![wav_rule(tmp.path())], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");

    engine.merge(vec![wav.clone()]);
    engine.flush().await.unwrap();

    write_pair(tmp.path(), "a", "こんにちは");
    engine.merge(vec![wav.clone()]);
    let report = engine.flush().await.unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(sink.calls().len(), 1);
    assert!(engine.tracker().is_empty());
}

#[tokio::test]
async fn changed_content_is_delivered_again() {
    let (tmp, sink) = setup();
    let mut engine = engine(vec![wav_rule(tmp.path())], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");

    engine.merge(vec![wav.clone()]);
    engine.flush().await.unwrap();

    write_pair(tmp.path(), "a", "こんばんは");
    engine.merge(vec![wav]);
    engine.flush().await.unwrap();

    let calls = sink.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1][0].text, "こんばんは");
}

#[tokio::test]
async fn pair_without_text_is_abandoned_after_stay_ceiling() {
    let (tmp, sink) = setup();
    let mut engine = engine(vec![wav_rule(tmp.path())], sink.clone());
    let wav = tmp.path().join("a.wav");
    write_wave(&wav);

    engine.merge(vec![wav.clone()]);
    let max_stay = engine.config().max_stay;
    let mut cycles = 0;
    while engine.tracker().contains(&wav) {
        let report = engine.flush().await.unwrap();
        cycles += 1;
        assert!(cycles <= max_stay + 1, "candidate was never abandoned");
        if engine.tracker().contains(&wav) {
            assert_eq!(report.stayed, 1);
        }
    }

    assert_eq!(cycles, max_stay + 1);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn failing_delivery_is_retried_at_most_max_retry_times() {
    let tmp = tempdir().unwrap();
    let sink = Arc::new(RecordingSink::rejecting());
    let mut engine = engine(vec![wav_rule(tmp.path())], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");

    engine.merge(vec![wav.clone()]);
    for _ in 0..engine.config().max_retry * 2 {
        engine.flush().await.unwrap();
    }

    assert!(!engine.tracker().contains(&wav));
    assert_eq!(sink.calls().len() as u32, engine.config().max_retry);
}

#[tokio::test]
async fn modifier_rename_moves_siblings() {
    let (tmp, sink) = setup();
    let mut rule = wav_rule(tmp.path());
    rule.modifier = Some(r#"filename = "b.wav""#.to_string());
    let mut engine = engine(vec![rule], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");
    std::fs::write(tmp.path().join("a.exo"), b"exo").unwrap();

    engine.merge(vec![wav.clone()]);
    engine.flush().await.unwrap();

    let calls = sink.calls();
    let item = &calls[0][0];
    assert_eq!(item.path.file_name().unwrap(), "b.wav");
    assert_eq!(item.source, wav);
    assert!(tmp.path().join("b.wav").exists());
    assert!(tmp.path().join("b.txt").exists());
    assert!(tmp.path().join("b.exo").exists());
    assert!(!wav.exists());

    // The renamed file is protected too.
    engine.merge(vec![tmp.path().join("b.wav")]);
    let report = engine.flush().await.unwrap();
    assert_eq!(report.duplicates, 1);
    assert_eq!(sink.calls().len(), 1);
}

#[tokio::test]
async fn content_regex_picks_second_rule() {
    let (tmp, sink) = setup();
    let mut first = wav_rule(tmp.path());
    first.text = Some(Regex::new("^めたん").unwrap());
    first.layer = 3;
    let mut second = wav_rule(tmp.path());
    second.text = Some(Regex::new("^ずんだもん").unwrap());
    second.layer = 5;
    second.user_data = "zunda".into();

    let mut engine = engine(vec![first, second], sink.clone());
    let wav = write_pair(tmp.path(), "a", "ずんだもん＞こんにちは");
    engine.merge(vec![wav]);
    engine.flush().await.unwrap();

    let item = &sink.calls()[0][0];
    assert_eq!(item.rule_index, 1);
    assert_eq!(item.layer, 5);
    assert_eq!(item.user_data, "zunda");
}

#[tokio::test]
async fn relocated_copy_is_not_redelivered() {
    let (tmp, sink) = setup();
    let dest = tmp.path().join("project");
    let mut rule = wav_rule(tmp.path());
    rule.file_move = FileMove::Copy;
    rule.expanded_dest_dir = dest.clone();

    let mut engine = engine(vec![rule], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");
    engine.merge(vec![wav]);
    engine.flush().await.unwrap();

    let delivered = sink.calls()[0][0].path.clone();
    assert_eq!(delivered.parent().unwrap(), dest.as_path());

    engine.merge(vec![delivered]);
    engine.flush().await.unwrap();
    assert_eq!(sink.calls().len(), 1);
}

#[tokio::test]
async fn batch_signal_delivers_and_reload_ends_run() {
    let (tmp, sink) = setup();
    let mut engine = engine(vec![wav_rule(tmp.path())], sink.clone());
    let wav = write_pair(tmp.path(), "a", "こんにちは");

    let (tx, rx) = mpsc::channel(8);
    tx.send(WatchSignal::Batch(vec![wav])).await.unwrap();
    tx.send(WatchSignal::Reload(ReloadReason::SettingsChanged))
        .await
        .unwrap();

    let exit = engine.run(rx, &CancellationToken::new()).await;
    assert_eq!(exit, RunExit::Reload(ReloadReason::SettingsChanged));
    assert_eq!(sink.calls().len(), 1);
}

#[tokio::test]
async fn cancellation_shuts_the_run_down() {
    let (tmp, sink) = setup();
    let mut engine = engine(vec![wav_rule(tmp.path())], sink);
    let (_tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(engine.run(rx, &cancel).await, RunExit::Shutdown);
}
