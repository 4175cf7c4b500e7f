//! Choosing between resume and a fresh start.

use std::path::Path;

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::segmenter::{partition, DownloadPlan};
use crate::storage::{self, StorageWriter, StorageWriterBuilder};

use super::DownloadError;

/// Plan, per-worker resume offsets and the open part file for one run.
pub(crate) struct Prepared {
    pub plan: DownloadPlan,
    pub resume: Vec<u64>,
    pub storage: StorageWriter,
    pub resumed: bool,
}

/// Resume from `store` when it can be trusted, otherwise start over.
pub(crate) fn prepare(
    store: &mut CheckpointStore,
    part: &Path,
    total_length: u64,
    worker_count: usize,
) -> Result<Prepared, DownloadError> {
    if store.exists() {
        match try_resume(store, part, total_length, worker_count) {
            Ok(Some(checkpoint)) => {
                let writer =
                    StorageWriter::open_existing(part).map_err(|e| DownloadError::storage(part, e))?;
                return Ok(from_checkpoint(&checkpoint, writer, true));
            }
            Ok(None) => {}
            Err(CheckpointError::Corrupt(reason)) => {
                tracing::warn!(
                    checkpoint = %store.path().display(),
                    %reason,
                    "discarding unusable checkpoint"
                );
            }
            Err(e) => return Err(e.into()),
        }
        store.delete()?;
    }
    fresh(store, part, total_length, worker_count)
}

fn try_resume(
    store: &mut CheckpointStore,
    part: &Path,
    total_length: u64,
    worker_count: usize,
) -> Result<Option<Checkpoint>, CheckpointError> {
    let checkpoint = store.load(worker_count)?;
    if checkpoint.total_length != total_length {
        tracing::warn!(
            stored = checkpoint.total_length,
            current = total_length,
            "resource length changed, discarding checkpoint"
        );
        return Ok(None);
    }
    match storage::file_len(part) {
        Some(len) if len == total_length => {}
        found => {
            tracing::warn!(
                part = %part.display(),
                ?found,
                expected = total_length,
                "part file missing or wrong size, discarding checkpoint"
            );
            return Ok(None);
        }
    }
    tracing::info!(
        done = checkpoint.bytes_done(),
        total = total_length,
        "resuming from checkpoint"
    );
    Ok(Some(checkpoint))
}

fn fresh(
    store: &mut CheckpointStore,
    part: &Path,
    total_length: u64,
    worker_count: usize,
) -> Result<Prepared, DownloadError> {
    let plan = partition(total_length, worker_count);
    let mut builder =
        StorageWriterBuilder::create(part).map_err(|e| DownloadError::storage(part, e))?;
    builder
        .preallocate(total_length)
        .map_err(|e| DownloadError::storage(part, e))?;
    let checkpoint = store.create_new(&plan)?;
    tracing::info!(
        total = total_length,
        workers = worker_count,
        "starting fresh download"
    );
    Ok(from_checkpoint(&checkpoint, builder.build(), false))
}

fn from_checkpoint(checkpoint: &Checkpoint, storage: StorageWriter, resumed: bool) -> Prepared {
    Prepared {
        plan: checkpoint.plan(),
        resume: checkpoint.entries.iter().map(|e| e.resume_offset).collect(),
        storage,
        resumed,
    }
}
