//! Verification and the final rename.

use std::path::Path;

use crate::checkpoint::CheckpointStore;
use crate::storage::{self, StorageWriter};

use super::{DownloadError, DownloadOutcome};

/// Check the part file against a fresh read of the checkpoint, then move it
/// into place. The checkpoint is removed only when every check passed.
pub(crate) fn finish(
    storage: StorageWriter,
    store: &mut CheckpointStore,
    output: &Path,
    total_length: u64,
    worker_count: usize,
) -> Result<DownloadOutcome, DownloadError> {
    let part = storage.part_path().to_path_buf();
    storage
        .sync()
        .map_err(|e| DownloadError::storage(&part, e))?;
    store.sync()?;

    let mut reader = CheckpointStore::new(store.path());
    let checkpoint = reader.load(worker_count)?;
    if !checkpoint.is_finished() || checkpoint.total_length != total_length {
        tracing::error!(
            done = checkpoint.bytes_done(),
            total = total_length,
            "checkpoint shows unfinished ranges"
        );
        return Ok(DownloadOutcome::IntegrityMismatch {
            expected: total_length,
            actual: checkpoint.bytes_done(),
        });
    }
    let part_len = storage
        .len()
        .map_err(|e| DownloadError::storage(&part, e))?;
    if part_len != total_length {
        tracing::error!(part_len, total = total_length, "part file has wrong size");
        return Ok(DownloadOutcome::IntegrityMismatch {
            expected: total_length,
            actual: part_len,
        });
    }

    storage
        .finalize(output)
        .map_err(|e| DownloadError::storage(output, e))?;
    let final_len = storage::file_len(output).unwrap_or(0);
    if final_len != total_length {
        tracing::error!(final_len, total = total_length, "output has wrong size after rename");
        return Ok(DownloadOutcome::IntegrityMismatch {
            expected: total_length,
            actual: final_len,
        });
    }
    store.delete()?;
    tracing::info!(output = %output.display(), bytes = total_length, "download complete");
    Ok(DownloadOutcome::Success {
        bytes: total_length,
    })
}
