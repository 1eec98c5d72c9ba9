//! UI automation adapters ("fairies") for TTS applications.
//!
//! A fairy drives one application's export action. The engine never talks
//! to a fairy directly: a successful [`Fairy::execute`] produces a wave/text
//! pair inside a watched directory and the pair re-enters through the file
//! watcher like any other.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

/// Native top-level window handle.
pub type WindowHandle = u64;

#[derive(Error, Debug)]
pub enum FairyError {
    #[error("no adapter supports the target window")]
    TargetNotFound,

    #[error("adapter {adapter} failed: {reason}")]
    Failed { adapter: String, reason: String },
}

/// Generates output paths for adapter exports.
pub trait Namer: Send + Sync {
    fn name(&self, speaker: &str, text: &str) -> PathBuf;
}

pub trait Fairy: Send + Sync {
    /// Short adapter name used in logs.
    fn name(&self) -> &str;
    fn is_target(&self, window: WindowHandle) -> bool;
    fn execute(&self, window: WindowHandle, namer: &dyn Namer) -> Result<(), FairyError>;
}

/// Registered adapters, tried in order.
#[derive(Default)]
pub struct Fairies {
    adapters: Vec<Box<dyn Fairy>>,
}

impl fmt::Debug for Fairies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| a.name()))
            .finish()
    }
}

impl Fairies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fairy: Box<dyn Fairy>) {
        self.adapters.push(fairy);
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run the first adapter that accepts `window`.
    pub fn execute(&self, window: WindowHandle, namer: &dyn Namer) -> Result<(), FairyError> {
        let fairy = self
            .adapters
            .iter()
            .find(|fairy| fairy.is_target(window))
            .ok_or(FairyError::TargetNotFound)?;
        info!(adapter = fairy.name(), window, "running adapter");
        fairy.execute(window, namer)
    }
}

/// `<dir>/<unix seconds>_<speaker>_<short text>.wav`
#[derive(Clone, Debug)]
pub struct TimestampNamer {
    dir: PathBuf,
}

/// Characters of the text kept in generated names.
pub const SHORT_TEXT_CHARS: usize = 10;

impl TimestampNamer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name_at(&self, unix_secs: i64, speaker: &str, text: &str) -> PathBuf {
        let file = format!(
            "{}_{}_{}.wav",
            unix_secs,
            to_filename(speaker, usize::MAX),
            to_filename(text, SHORT_TEXT_CHARS)
        );
        debug!(file = %file, "generated output name");
        self.dir.join(file)
    }
}

impl Namer for TimestampNamer {
    fn name(&self, speaker: &str, text: &str) -> PathBuf {
        self.name_at(Utc::now().timestamp(), speaker, text)
    }
}

fn is_name_char(c: char) -> bool {
    !(c < '\u{20}' || c == '\u{7f}' || " \"*/:<>?\\|".contains(c))
}

/// Strip characters that are unsafe in file names and keep at most
/// `max_chars` characters, ending in `…` when something was cut.
pub fn to_filename(text: &str, max_chars: usize) -> String {
    let mut out: Vec<char> = Vec::new();
    for c in text.chars().filter(|&c| is_name_char(c)) {
        if out.len() == max_chars {
            if let Some(last) = out.last_mut() {
                *last = '…';
            }
            break;
        }
        out.push(c);
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(to_filename("a b\t\"c*/:<>?\\|d\u{7f}", 100), "abcd");
        assert_eq!(to_filename("こんにちは", 100), "こんにちは");
    }

    #[test]
    fn truncates_with_ellipsis() {
        assert_eq!(to_filename("0123456789", 10), "0123456789");
        assert_eq!(to_filename("0123456789A", 10), "012345678…");
        assert_eq!(to_filename("abc", 0), "");
    }

    #[test]
    fn namer_layout() {
        let namer = TimestampNamer::new("/out");
        let path = namer.name_at(1_700_000_000, "zunda mon", "ずんだもんなのだ、よろしくね");
        assert_eq!(
            path,
            Path::new("/out").join("1700000000_zundamon_ずんだもんなのだ、….wav")
        );
    }

    struct Counting {
        target: WindowHandle,
        runs: Arc<AtomicUsize>,
    }

    impl Fairy for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn is_target(&self, window: WindowHandle) -> bool {
            window == self.target
        }

        fn execute(&self, _window: WindowHandle, namer: &dyn Namer) -> Result<(), FairyError> {
            let _ = namer.name("x", "y");
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn dispatches_to_matching_adapter() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut fairies = Fairies::new();
        fairies.register(Box::new(Counting {
            target: 42,
            runs: runs.clone(),
        }));
        let namer = TimestampNamer::new("/out");

        fairies.execute(42, &namer).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(matches!(
            fairies.execute(7, &namer),
            Err(FairyError::TargetNotFound)
        ));
    }
}
