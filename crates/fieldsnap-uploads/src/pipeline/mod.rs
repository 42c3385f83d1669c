//! Background upload pipeline
//!
//! A [`BatchRegistry`] owns every batch. `enqueue` freezes a batch of
//! [`UploadItem`]s in `queued`, spawns a small worker pool for it and returns.
//! Workers claim items through a shared cursor and drive each one through
//! compression, transfer (with retry) and metadata recording. Every state
//! change is announced on the [`ObserverBus`]; observers re-read the registry
//! instead of receiving deltas. Completed batches stay visible for a grace
//! window, then a timer evicts them.

mod observer;
mod registry;
mod transfer;
mod types;
mod worker;

pub use observer::{ObserverBus, Subscription};
pub use registry::{BatchRegistry, PipelineStages};
pub use transfer::{RetryPolicy, TransferReceipt, TransferStage};
pub use types::{ItemStatus, UploadBatch, UploadItem};

use std::any::Any;

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
