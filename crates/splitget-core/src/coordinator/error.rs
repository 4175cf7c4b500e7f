use std::io;
use std::path::PathBuf;

use crate::checkpoint::CheckpointError;
use crate::http::FetchError;

/// Fatal errors of [`Coordinator::run`](super::Coordinator::run).
///
/// Recoverable conditions (failed ranges, short files, cancellation) are
/// reported as [`DownloadOutcome`](super::DownloadOutcome) variants instead.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("worker count {0} is outside 1..={max}", max = super::MAX_WORKERS)]
    InvalidWorkerCount(usize),
    #[error("cannot determine resource length")]
    MetadataUnavailable(#[source] FetchError),
    #[error("storage error on {}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl DownloadError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DownloadError::Storage {
            path: path.into(),
            source,
        }
    }
}
