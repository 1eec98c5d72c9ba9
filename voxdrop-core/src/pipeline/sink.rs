//! Delivery sink contract.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedupe::Fingerprint;
use crate::host::ProjectSnapshot;
use crate::rules::TextEncoding;

/// Order of items inside one delivery batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Oldest wave modification time first.
    #[default]
    ModDate,
    /// Path order.
    Name,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::ModDate => "moddate",
            SortMode::Name => "name",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prepared pair handed to the sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeliveryItem {
    /// Candidate path as discovered by the watcher.
    pub source: PathBuf,
    /// Wave path after relocation and renaming.
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub try_count: u32,
    pub max_retry: u32,
    pub modified: DateTime<Utc>,
    /// Zero-based position of the matched rule.
    pub rule_index: usize,
    pub dir: String,
    pub file: String,
    pub encoding: TextEncoding,
    pub layer: i64,
    pub text: String,
    pub user_data: String,
    pub padding: i64,
    pub exo_file: String,
    pub lua_file: String,
}

/// What the sink did with one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Consumed candidate path.
    pub source: PathBuf,
    pub fingerprint: Fingerprint,
    /// Final location when it differs from `source`.
    pub dest: Option<PathBuf>,
}

impl Resolution {
    /// Resolution for a delivered item.
    pub fn delivered(item: &DeliveryItem) -> Self {
        Self {
            source: item.source.clone(),
            fingerprint: item.fingerprint,
            dest: (item.path != item.source).then(|| item.path.clone()),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("host rejected the batch: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The host side of delivery. One call per flush with every prepared item.
///
/// Implementations return one [`Resolution`] per item they consumed. Items
/// missing from the result are retried.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(
        &self,
        items: &[DeliveryItem],
        sort: SortMode,
        project: &ProjectSnapshot,
    ) -> Result<Vec<Resolution>, SinkError>;
}
