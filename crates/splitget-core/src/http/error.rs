//! Errors from metadata probes and ranged transfers.

use crate::checkpoint::CheckpointError;

/// Error returned by one metadata fetch or one ranged transfer attempt.
///
/// Kept separate from `anyhow` so workers can classify it and decide retries.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Neither HEAD nor a one-byte range probe yielded the resource length.
    #[error("resource length unavailable: {0}")]
    MetadataUnavailable(String),
    /// Curl reported a transport error (timeout, connection reset, early close, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Server answered without honoring the requested range (e.g. 200 with
    /// the full body, or a mismatched Content-Range).
    #[error("range not honored (HTTP {status})")]
    RangeNotHonored { status: u32 },
    /// Server finished the response before the whole range arrived.
    #[error("incomplete range: expected {expected} bytes, got {received}")]
    IncompleteRange { expected: u64, received: u64 },
    /// Writing a received block to the output file failed.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// Persisting progress to the checkpoint failed.
    #[error("checkpoint: {0}")]
    Checkpoint(#[source] CheckpointError),
    /// The transfer was stopped on request between two blocks.
    #[error("stopped")]
    Stopped,
}
