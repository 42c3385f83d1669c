//! Fieldsnap Uploads Library
//!
//! Background pipeline that moves site photos from local disk to an
//! S3-compatible object store and indexes them in PostgreSQL.
//!
//! # Overview
//!
//! - **Pipeline**: [`BatchRegistry`] accepts batches of files, returns at once
//!   and processes them on a bounded per-batch worker pool
//! - **Compression**: photos are downscaled and re-encoded as JPEG before transfer
//! - **Storage Backend**: S3/MinIO via `aws-sdk-s3`, with retry and backoff
//! - **Metadata**: one `site_photos` row per stored photo, written with SQLx
//! - **Progress**: listeners and a `watch` channel announce every change;
//!   consumers re-read snapshots from the registry
//!
//! # Example
//!
//! ```no_run
//! use fieldsnap_uploads::{
//!     compression::ImageCompressor, config::Config, metadata::PgMetadataRecorder,
//!     storage::Storage, BatchRegistry, PipelineStages,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let stages = PipelineStages {
//!         compressor: Arc::new(ImageCompressor::new(config.compression.clone())),
//!         store: Arc::new(Storage::new(config.storage.clone())),
//!         recorder: Arc::new(PgMetadataRecorder::connect(&config.database).await?),
//!     };
//!     let registry = BatchRegistry::new(stages, config.pipeline.clone())?;
//!
//!     let batch_id = registry.enqueue(["site/a.jpg", "site/b.jpg"], "S1", "before")?;
//!     if let Some(batch) = registry.wait_for_completion(batch_id).await {
//!         println!("{}", batch.progress_label());
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod compression;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod storage;

// Re-export commonly used types
pub use error::{EnqueueError, PipelineError, TransitionError};
pub use pipeline::{
    BatchRegistry, ItemStatus, PipelineStages, Subscription, UploadBatch, UploadItem,
};
