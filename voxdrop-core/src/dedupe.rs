//! Content fingerprints and the resend-protection log.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::wave;

/// How long a delivered path is protected against redelivery.
pub const RESEND_PROTECT: Duration = Duration::from_secs(5);

/// Order-dependent digest over a wave file and its companion text.
///
/// The text digest is seeded with the finished audio digest rather than
/// hashing a plain concatenation, so an empty text and a text that moved
/// bytes across the boundary never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Validate the wave header, then hash both files.
    ///
    /// A header that does not validate yields [`EngineError::InvalidWave`],
    /// which callers treat as "not ready yet".
    pub fn compute(wav: &Path, txt: &Path) -> Result<Self> {
        let mut wav_file = BufReader::new(File::open(wav)?);
        wave::inspect_reader(wav, &mut wav_file)?;
        wav_file.seek(SeekFrom::Start(0))?;

        let mut audio = Sha256::new();
        io::copy(&mut wav_file, &mut audio)?;

        let mut text_file = File::open(txt).map_err(|source| EngineError::MissingText {
            path: txt.to_path_buf(),
            source,
        })?;
        let mut combined = Sha256::new();
        combined.update(audio.finalize());
        io::copy(&mut text_file, &mut combined)?;

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&combined.finalize());
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A path that was just delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentRecord {
    pub fingerprint: Fingerprint,
    pub at: Instant,
}

/// Recently delivered paths, keyed by exact path.
#[derive(Debug)]
pub struct SentLog {
    window: Duration,
    records: HashMap<PathBuf, SentRecord>,
}

impl Default for SentLog {
    fn default() -> Self {
        Self::new(RESEND_PROTECT)
    }
}

impl SentLog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: HashMap::new(),
        }
    }

    /// Drop records older than the protection window.
    pub fn expire(&mut self, now: Instant) {
        let window = self.window;
        self.records.retain(|path, record| {
            let keep = now.saturating_duration_since(record.at) < window;
            if !keep {
                debug!(path = %path.display(), "resend protection expired");
            }
            keep
        });
    }

    pub fn record(&mut self, path: impl Into<PathBuf>, fingerprint: Fingerprint, now: Instant) {
        self.records
            .insert(path.into(), SentRecord { fingerprint, at: now });
    }

    /// True iff `path` was delivered inside the window with the same content.
    pub fn is_duplicate(&self, path: &Path, fingerprint: &Fingerprint, now: Instant) -> bool {
        self.live(path, now)
            .is_some_and(|record| record.fingerprint == *fingerprint)
    }

    /// True iff `path` was delivered inside the window, whatever its content.
    pub fn recently_sent(&self, path: &Path, now: Instant) -> bool {
        self.live(path, now).is_some()
    }

    fn live(&self, path: &Path, now: Instant) -> Option<&SentRecord> {
        self.records
            .get(path)
            .filter(|record| now.saturating_duration_since(record.at) < self.window)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
