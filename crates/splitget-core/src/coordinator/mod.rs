//! Orchestrates one download: length probe, plan or resume, parallel
//! workers, verification and the final rename.

mod error;
mod finish;
mod plan;

pub use error::DownloadError;

use std::fs::File;
use std::path::Path;

use crate::checkpoint::CheckpointStore;
use crate::control::CancelToken;
use crate::downloader::{run_workers, ChunkWorker, WorkerContext, WorkerOutcome};
use crate::http::RangeClient;
use crate::progress::ProgressTracker;
use crate::retry::RetryPolicy;
use crate::storage;

/// Upper bound on concurrent ranges; each one is an OS thread and a connection.
pub const MAX_WORKERS: usize = 256;

/// How a download run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Every range fetched, verified and renamed into place.
    Success { bytes: u64 },
    /// The output already existed with the expected length; nothing fetched.
    AlreadyComplete { bytes: u64 },
    /// These workers gave up. The checkpoint is kept for a later resume.
    PartialFailure { failed_workers: Vec<usize> },
    /// Workers reported success but the result did not check out.
    IntegrityMismatch { expected: u64, actual: u64 },
    /// Stopped on request. The checkpoint is kept.
    Cancelled,
}

impl DownloadOutcome {
    /// True when the output file is complete.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::Success { .. } | DownloadOutcome::AlreadyComplete { .. }
        )
    }
}

/// Downloads one URL to one output path with a fixed number of workers.
pub struct Coordinator<C: RangeClient> {
    client: C,
    policy: RetryPolicy,
    cancel: CancelToken,
    progress: Option<ProgressTracker>,
}

impl<C: RangeClient> Coordinator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use `cancel` to stop a running download from another thread.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Download `url` into `output` using `worker_count` concurrent ranges,
    /// resuming from `<output>.ckpt` when it matches.
    pub fn run(
        &self,
        url: &str,
        worker_count: usize,
        output: &Path,
    ) -> Result<DownloadOutcome, DownloadError> {
        if worker_count == 0 || worker_count > MAX_WORKERS {
            return Err(DownloadError::InvalidWorkerCount(worker_count));
        }
        let total_length = self
            .client
            .fetch_length(url)
            .map_err(DownloadError::MetadataUnavailable)?;
        tracing::debug!(url, total = total_length, workers = worker_count, "resource length");

        let mut store = CheckpointStore::for_output(output);
        let part = storage::part_path(output);

        if storage::file_len(output) == Some(total_length) {
            tracing::info!(output = %output.display(), "output already complete");
            store.delete()?;
            remove_stale(&part)?;
            return Ok(DownloadOutcome::AlreadyComplete {
                bytes: total_length,
            });
        }

        if total_length == 0 {
            File::create(output).map_err(|e| DownloadError::storage(output, e))?;
            store.delete()?;
            remove_stale(&part)?;
            tracing::info!(output = %output.display(), "empty resource, wrote empty file");
            return Ok(DownloadOutcome::Success { bytes: 0 });
        }

        let prepared = plan::prepare(&mut store, &part, total_length, worker_count)?;
        let done: Vec<u64> = prepared
            .plan
            .ranges
            .iter()
            .zip(&prepared.resume)
            .map(|(r, &resume)| resume.saturating_sub(r.start))
            .collect();
        if let Some(p) = &self.progress {
            p.begin(total_length, &done);
        }
        if prepared.resumed {
            tracing::debug!(?done, "per-worker bytes carried over");
        }

        let workers = prepared
            .plan
            .ranges
            .iter()
            .zip(&prepared.resume)
            .enumerate()
            .map(|(id, (range, &resume))| ChunkWorker::new(id, *range, resume))
            .collect();
        let ctx = WorkerContext {
            url,
            client: &self.client,
            storage: &prepared.storage,
            checkpoint: &store,
            policy: self.policy,
            cancel: &self.cancel,
            progress: self.progress.as_ref(),
        };
        let reports = run_workers(workers, &ctx);

        let unfinished = reports
            .iter()
            .any(|r| r.outcome != WorkerOutcome::Done);
        if self.cancel.is_cancelled() && unfinished {
            prepared
                .storage
                .sync()
                .map_err(|e| DownloadError::storage(&part, e))?;
            store.sync()?;
            tracing::info!("download cancelled, checkpoint kept");
            return Ok(DownloadOutcome::Cancelled);
        }

        let failed_workers: Vec<usize> = reports
            .iter()
            .filter(|r| matches!(r.outcome, WorkerOutcome::Failed(_)))
            .map(|r| r.worker)
            .collect();
        if !failed_workers.is_empty() {
            store.sync()?;
            tracing::warn!(?failed_workers, "some ranges failed, checkpoint kept");
            return Ok(DownloadOutcome::PartialFailure { failed_workers });
        }

        finish::finish(prepared.storage, &mut store, output, total_length, worker_count)
    }
}

fn remove_stale(path: &Path) -> Result<(), DownloadError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale part file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::storage(path, e)),
    }
}
