//! Per-batch workers

use super::panic_message;
use super::registry::RegistryInner;
use super::types::ItemStatus;
use crate::error::PipelineError;
use fieldsnap_common::types::{Category, SiteKey};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything a worker needs to process one item without holding the lock
pub(super) struct ItemTarget {
    pub index: usize,
    pub item_id: Uuid,
    pub source: PathBuf,
    pub key: String,
    pub site_key: SiteKey,
    pub category: Category,
}

/// Work list shared by the workers of one batch
pub(super) struct BatchJob {
    batch_id: Uuid,
    cursor: AtomicUsize,
    targets: Vec<ItemTarget>,
}

impl BatchJob {
    pub fn new(batch_id: Uuid, targets: Vec<ItemTarget>) -> Self {
        Self {
            batch_id,
            cursor: AtomicUsize::new(0),
            targets,
        }
    }

    /// Exclusive claim of the next unprocessed item
    fn claim(&self) -> Option<&ItemTarget> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.targets.get(index)
    }
}

pub(super) async fn run_worker(inner: Arc<RegistryInner>, job: Arc<BatchJob>) {
    let batch_id = job.batch_id;

    while let Some(target) = job.claim() {
        // Held until the item is terminal
        let _permit = match &inner.global_permits {
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        let outcome = AssertUnwindSafe(process_item(&inner, batch_id, target))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                warn!(batch_id = %batch_id, item_id = %target.item_id, error = %e, "Upload item failed");
                Some(e.to_string())
            },
            Err(payload) => {
                let e = PipelineError::Panicked(panic_message(payload.as_ref()));
                warn!(batch_id = %batch_id, item_id = %target.item_id, error = %e, "Upload item failed");
                Some(e.to_string())
            },
        };

        inner.finish_item(batch_id, target.index, error);
    }

    debug!(batch_id = %batch_id, "Worker finished");
}

async fn process_item(
    inner: &RegistryInner,
    batch_id: Uuid,
    target: &ItemTarget,
) -> Result<(), PipelineError> {
    inner.advance(batch_id, target.index, ItemStatus::Compressing);

    let compressed = inner
        .stages
        .compressor
        .compress(&target.source)
        .await
        .map_err(PipelineError::Compression)?;

    inner.advance(batch_id, target.index, ItemStatus::Uploading);

    let receipt = inner
        .transfer
        .transfer(&target.key, compressed.bytes, &compressed.content_type)
        .await?;

    inner.note_transfer(batch_id, target.index, &receipt);

    if let Err(e) = inner
        .stages
        .recorder
        .insert(&target.site_key, &receipt.url, &target.category)
        .await
    {
        warn!(
            batch_id = %batch_id,
            item_id = %target.item_id,
            key = %target.key,
            url = %receipt.url,
            "Orphaned object: stored but metadata insert failed"
        );
        return Err(PipelineError::Metadata(e));
    }

    debug!(batch_id = %batch_id, item_id = %target.item_id, url = %receipt.url, "Item uploaded");

    Ok(())
}
