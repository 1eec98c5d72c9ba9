//! Delivery sink that spools each batch as a JSON manifest.
//!
//! A host-side bridge consumes the outbox. Manifests are written to a
//! temporary name and renamed, so a reader never sees a partial file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use voxdrop_core::host::ProjectSnapshot;
use voxdrop_core::pipeline::sink::{
    DeliveryItem, DeliverySink, Resolution, SinkError, SortMode,
};

#[derive(Debug, Serialize)]
struct BatchManifest<'a> {
    created_at: DateTime<Utc>,
    sort: SortMode,
    project: &'a ProjectSnapshot,
    items: &'a [DeliveryItem],
}

#[derive(Debug)]
pub struct SpoolSink {
    outbox: PathBuf,
    sequence: AtomicU64,
}

impl SpoolSink {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }
}

#[async_trait]
impl DeliverySink for SpoolSink {
    async fn deliver(
        &self,
        items: &[DeliveryItem],
        sort: SortMode,
        project: &ProjectSnapshot,
    ) -> Result<Vec<Resolution>, SinkError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let created_at = Utc::now();
        let manifest = BatchManifest {
            created_at,
            sort,
            project,
            items,
        };
        let body = serde_json::to_vec_pretty(&manifest)?;

        tokio::fs::create_dir_all(&self.outbox).await?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{seq:04}.json", created_at.format("%Y%m%dT%H%M%S%.3fZ"));
        let staging = self.outbox.join(format!(".{name}.partial"));
        let target = self.outbox.join(&name);

        tokio::fs::write(&staging, &body).await?;
        tokio::fs::rename(&staging, &target).await?;
        debug!(bytes = body.len(), path = %target.display(), "manifest written");
        info!(items = items.len(), manifest = %name, "batch spooled");

        Ok(items.iter().map(Resolution::delivered).collect())
    }
}
