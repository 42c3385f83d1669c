//! Upload pipeline error types

use crate::pipeline::ItemStatus;
use fieldsnap_common::FieldsnapError;
use thiserror::Error;

/// Why a single item ended in `failed`
///
/// These never reach the `enqueue` caller; they are rendered into the item's
/// error message and counted in the batch's `fail_count`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("compression failed: {0:#}")]
    Compression(#[source] anyhow::Error),

    #[error("upload failed after {attempts} attempt(s): {source:#}")]
    Transfer {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("metadata insert failed after upload (object left unindexed): {0:#}")]
    Metadata(#[source] anyhow::Error),

    #[error("worker panicked while processing item: {0}")]
    Panicked(String),
}

/// Synchronous rejection of an `enqueue` call; no batch is created
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("At least one file is required")]
    NoFiles,

    #[error(transparent)]
    Invalid(#[from] FieldsnapError),
}

/// Attempted state-machine edge that is not allowed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ItemStatus,
    pub to: ItemStatus,
}
