//! Batch registry: owner of every batch and entry point of the pipeline

use super::observer::{ObserverBus, Subscription};
use super::transfer::{RetryPolicy, TransferReceipt, TransferStage};
use super::types::{ItemStatus, UploadBatch};
use super::worker::{self, BatchJob, ItemTarget};
use crate::compression::Compressor;
use crate::config::PipelineConfig;
use crate::error::EnqueueError;
use crate::metadata::MetadataRecorder;
use crate::storage::ObjectStore;
use anyhow::Context;
use fieldsnap_common::types::{file_name_of, Category, SiteKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// The three collaborators every item passes through
#[derive(Clone)]
pub struct PipelineStages {
    pub compressor: Arc<dyn Compressor>,
    pub store: Arc<dyn ObjectStore>,
    pub recorder: Arc<dyn MetadataRecorder>,
}

/// Shared, cloneable handle to the upload pipeline
///
/// Construct one per process and hand clones to whoever needs to enqueue or
/// observe. Batches keep processing after the enqueuing caller is gone; they
/// are removed only by the eviction timer once complete and past the grace
/// window.
#[derive(Clone)]
pub struct BatchRegistry {
    inner: Arc<RegistryInner>,
}

pub(super) struct RegistryInner {
    batches: Mutex<HashMap<Uuid, UploadBatch>>,
    bus: ObserverBus,
    pub(super) stages: PipelineStages,
    pub(super) transfer: TransferStage,
    pub(super) global_permits: Option<Arc<Semaphore>>,
    config: PipelineConfig,
    runtime: Handle,
}

impl BatchRegistry {
    /// Build a registry on the current tokio runtime
    pub fn new(stages: PipelineStages, config: PipelineConfig) -> anyhow::Result<Self> {
        let runtime =
            Handle::try_current().context("BatchRegistry must be created inside a tokio runtime")?;
        Self::with_runtime(runtime, stages, config)
    }

    /// Build a registry whose workers and timers run on `runtime`
    pub fn with_runtime(
        runtime: Handle,
        stages: PipelineStages,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid pipeline configuration")?;

        let transfer = TransferStage::new(stages.store.clone(), RetryPolicy::from(&config));
        let global_permits = config.max_global_transfers.map(|n| Arc::new(Semaphore::new(n)));

        Ok(Self {
            inner: Arc::new(RegistryInner {
                batches: Mutex::new(HashMap::new()),
                bus: ObserverBus::new(),
                stages,
                transfer,
                global_permits,
                config,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Queue `files` for upload under one site and category
    ///
    /// Returns as soon as the batch is registered; compression, transfer and
    /// indexing happen on background workers. Only input validation can fail
    /// here.
    pub fn enqueue<I, P>(&self, files: I, site_key: &str, category: &str) -> Result<Uuid, EnqueueError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let site_key = SiteKey::parse(site_key)?;
        let category = Category::parse(category)?;

        let files = files
            .into_iter()
            .map(|p| {
                let path: PathBuf = p.as_ref().to_path_buf();
                file_name_of(&path).map(|name| (path, name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if files.is_empty() {
            return Err(EnqueueError::NoFiles);
        }

        let batch = UploadBatch::new(site_key, category, files);
        let batch_id = batch.id;
        let job = Arc::new(BatchJob::new(
            batch_id,
            batch
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| ItemTarget {
                    index,
                    item_id: item.id,
                    source: item.source.clone(),
                    key: item.object_key(),
                    site_key: item.site_key.clone(),
                    category: item.category.clone(),
                })
                .collect(),
        ));

        let workers = self.inner.config.workers_per_batch.min(batch.total_count);

        info!(
            batch_id = %batch_id,
            site_key = %batch.site_key,
            category = %batch.category,
            items = batch.total_count,
            workers,
            "Enqueued upload batch"
        );

        self.inner.batches.lock().insert(batch_id, batch);
        self.inner.bus.notify();

        for _ in 0..workers {
            let inner = self.inner.clone();
            let job = job.clone();
            self.inner.runtime.spawn(worker::run_worker(inner, job));
        }

        Ok(batch_id)
    }

    /// Snapshots of unfinished batches and batches inside their grace window,
    /// oldest first
    pub fn active_batches(&self) -> Vec<UploadBatch> {
        let now = Instant::now();
        let grace = self.inner.config.grace_period();

        let mut batches: Vec<UploadBatch> = self
            .inner
            .batches
            .lock()
            .values()
            .filter(|b| b.visible_at(now, grace))
            .cloned()
            .collect();

        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        batches
    }

    /// Snapshot of one batch, under the same visibility rule as `active_batches`
    pub fn batch(&self, batch_id: Uuid) -> Option<UploadBatch> {
        let now = Instant::now();
        let grace = self.inner.config.grace_period();

        self.inner
            .batches
            .lock()
            .get(&batch_id)
            .filter(|b| b.visible_at(now, grace))
            .cloned()
    }

    /// Register a change listener
    ///
    /// The listener is called after every mutation with the registry lock
    /// released, so it may query the registry. It must not capture a
    /// `BatchRegistry` clone unless the subscription is dropped explicitly.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(listener)
    }

    /// Version counter bumped on every mutation
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.bus.changes()
    }

    /// Wait until the batch completes and return its final snapshot
    ///
    /// `None` when the batch is unknown or has already been evicted.
    pub async fn wait_for_completion(&self, batch_id: Uuid) -> Option<UploadBatch> {
        let mut changes = self.changes();

        loop {
            // Unfiltered: a completed batch counts until it is evicted
            let snapshot = self.inner.batches.lock().get(&batch_id).cloned()?;
            if snapshot.is_complete() {
                return Some(snapshot);
            }
            if changes.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl std::fmt::Debug for BatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRegistry")
            .field("batches", &self.inner.batches.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl RegistryInner {
    /// Apply `f` to one batch under the lock, then notify if it ran
    fn mutate<T>(&self, batch_id: Uuid, f: impl FnOnce(&mut UploadBatch) -> T) -> Option<T> {
        let result = {
            let mut batches = self.batches.lock();
            batches.get_mut(&batch_id).map(f)
        };
        if result.is_some() {
            self.bus.notify();
        }
        result
    }

    pub(super) fn advance(&self, batch_id: Uuid, index: usize, next: ItemStatus) {
        let result = self.mutate(batch_id, |batch| batch.advance(index, next));
        if let Some(Err(e)) = result {
            error!(batch_id = %batch_id, index, error = %e, "Rejected item status change");
        }
    }

    pub(super) fn note_transfer(&self, batch_id: Uuid, index: usize, receipt: &TransferReceipt) {
        self.mutate(batch_id, |batch| {
            batch.note_transfer(index, &receipt.url, receipt.attempts)
        });
    }

    /// Terminal update for one item; arms eviction when it was the last one
    pub(super) fn finish_item(self: &Arc<Self>, batch_id: Uuid, index: usize, error: Option<String>) {
        let now = Instant::now();
        let result = self.mutate(batch_id, |batch| {
            batch.resolve(index, error, now).map(|completed| {
                (completed, batch.done_count, batch.fail_count, batch.total_count)
            })
        });

        match result {
            Some(Ok((true, done, failed, total))) => {
                info!(batch_id = %batch_id, done, failed, total, "Upload batch complete");
                self.schedule_eviction(batch_id);
            },
            Some(Ok(_)) => {},
            Some(Err(e)) => {
                error!(batch_id = %batch_id, index, error = %e, "Rejected terminal item update");
            },
            None => {
                error!(batch_id = %batch_id, index, "Finished item for a batch that is not registered");
            },
        }
    }

    fn schedule_eviction(self: &Arc<Self>, batch_id: Uuid) {
        let grace = self.config.grace_period();
        let registry: Weak<RegistryInner> = Arc::downgrade(self);

        self.runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = registry.upgrade() {
                inner.evict(batch_id);
            }
        });
    }

    fn evict(&self, batch_id: Uuid) {
        let removed = self.batches.lock().remove(&batch_id);
        if removed.is_some() {
            debug!(batch_id = %batch_id, "Evicted completed batch");
            self.bus.notify();
        }
    }
}
