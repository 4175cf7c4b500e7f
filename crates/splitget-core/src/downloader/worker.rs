//! One worker per byte range: fetch, write at offset, persist progress, retry.

use crate::checkpoint::CheckpointStore;
use crate::control::CancelToken;
use crate::http::{FetchError, RangeClient};
use crate::progress::ProgressTracker;
use crate::retry::{classify, RetryDecision, RetryPolicy};
use crate::segmenter::ByteRange;
use crate::storage::StorageWriter;

/// Lifecycle of a [`ChunkWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Pending,
    Fetching,
    Writing,
    Retrying,
    Done,
    Failed,
    Stopped,
}

/// Terminal result of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Whole range is on disk and recorded in the checkpoint.
    Done,
    /// Gave up; the message describes the last error.
    Failed(String),
    /// Cancelled at a safe point; the checkpoint matches what is on disk.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub outcome: WorkerOutcome,
    /// Resume offset when the worker stopped running.
    pub resume_offset: u64,
}

/// Everything the workers of one download share. All fields are read-only
/// or internally synchronized; each worker touches only its own byte span
/// and its own checkpoint slot.
pub struct WorkerContext<'a> {
    pub url: &'a str,
    pub client: &'a dyn RangeClient,
    pub storage: &'a StorageWriter,
    pub checkpoint: &'a CheckpointStore,
    pub policy: RetryPolicy,
    pub cancel: &'a CancelToken,
    pub progress: Option<&'a ProgressTracker>,
}

/// Downloads one range, resuming at `resume_offset`.
#[derive(Debug)]
pub struct ChunkWorker {
    id: usize,
    range: ByteRange,
    resume_offset: u64,
    state: WorkerState,
}

impl ChunkWorker {
    pub fn new(id: usize, range: ByteRange, resume_offset: u64) -> Self {
        Self {
            id,
            range,
            resume_offset: resume_offset.clamp(range.start, range.end_exclusive()),
            state: WorkerState::Pending,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn is_complete(&self) -> bool {
        self.resume_offset == self.range.end_exclusive()
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::trace!(worker = self.id, from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    /// Run to a terminal state. Transient faults are retried from the current
    /// resume offset with backoff; an attempt that made progress resets the
    /// attempt budget.
    pub fn run(mut self, ctx: &WorkerContext<'_>) -> WorkerReport {
        if self.is_complete() {
            self.transition(WorkerState::Done);
            tracing::debug!(worker = self.id, "range already complete");
            return self.report(WorkerOutcome::Done);
        }
        tracing::debug!(
            worker = self.id,
            start = self.range.start,
            end = self.range.end,
            resume = self.resume_offset,
            "worker starting"
        );

        let mut attempt = 1u32;
        loop {
            if ctx.cancel.is_cancelled() {
                return self.stop(ctx);
            }
            self.transition(WorkerState::Fetching);
            let before = self.resume_offset;
            let err = match self.attempt(ctx) {
                Ok(()) => break,
                Err(FetchError::Stopped) => return self.stop(ctx),
                Err(e) => e,
            };
            if self.is_complete() {
                // The whole range landed even though the transfer ended badly.
                break;
            }
            if self.resume_offset > before {
                attempt = 1;
            }
            match ctx.policy.decide(attempt, classify(&err)) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        worker = self.id,
                        attempt,
                        resume = self.resume_offset,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "range attempt failed, retrying"
                    );
                    self.transition(WorkerState::Retrying);
                    if ctx.cancel.sleep(delay) {
                        return self.stop(ctx);
                    }
                    attempt += 1;
                }
                RetryDecision::NoRetry => {
                    tracing::error!(
                        worker = self.id,
                        attempt,
                        resume = self.resume_offset,
                        error = %err,
                        "worker failed"
                    );
                    self.transition(WorkerState::Failed);
                    self.persist(ctx);
                    return self.report(WorkerOutcome::Failed(err.to_string()));
                }
            }
        }

        self.transition(WorkerState::Done);
        tracing::debug!(worker = self.id, "worker done");
        self.report(WorkerOutcome::Done)
    }

    /// One ranged GET for `[resume_offset, range.end]`. Each block is written
    /// at the advancing offset, then the new offset goes to the checkpoint.
    /// Cancellation is checked only after both have happened. A stream that
    /// ends before the range does is an `IncompleteRange` whatever the client
    /// reported.
    fn attempt(&mut self, ctx: &WorkerContext<'_>) -> Result<(), FetchError> {
        let remaining = self.range.remaining_from(self.resume_offset);
        let id = self.id;
        let range_start = self.range.start;
        let mut offset = self.resume_offset;
        let result = {
            let state = &mut self.state;
            let mut sink = |block: &[u8]| -> Result<(), FetchError> {
                if *state != WorkerState::Writing {
                    *state = WorkerState::Writing;
                }
                ctx.storage
                    .write_at(offset, block)
                    .map_err(FetchError::Storage)?;
                let next = offset + block.len() as u64;
                ctx.checkpoint
                    .update(id, next)
                    .map_err(FetchError::Checkpoint)?;
                // Only bytes recorded in the checkpoint count as done.
                offset = next;
                if let Some(p) = ctx.progress {
                    p.set_worker_bytes(id, offset - range_start);
                }
                if ctx.cancel.is_cancelled() {
                    return Err(FetchError::Stopped);
                }
                Ok(())
            };
            ctx.client.stream_range(ctx.url, remaining, &mut sink)
        };
        self.resume_offset = offset;
        result?;
        if !self.is_complete() {
            return Err(FetchError::IncompleteRange {
                expected: remaining.len(),
                received: offset - remaining.start,
            });
        }
        Ok(())
    }

    /// Flush the checkpoint before leaving with unfinished work.
    fn persist(&self, ctx: &WorkerContext<'_>) {
        if let Err(e) = ctx.checkpoint.sync() {
            tracing::warn!(worker = self.id, error = %e, "checkpoint sync failed");
        }
    }

    fn stop(mut self, ctx: &WorkerContext<'_>) -> WorkerReport {
        self.transition(WorkerState::Stopped);
        self.persist(ctx);
        tracing::info!(worker = self.id, resume = self.resume_offset, "worker stopped");
        self.report(WorkerOutcome::Stopped)
    }

    fn report(&self, outcome: WorkerOutcome) -> WorkerReport {
        WorkerReport {
            worker: self.id,
            outcome,
            resume_offset: self.resume_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::partition;
    use crate::storage::StorageWriterBuilder;
    use crate::test_support::{body, FakeClient, Fault};
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        part: std::path::PathBuf,
        storage: StorageWriter,
        checkpoint: CheckpointStore,
        cancel: CancelToken,
        progress: ProgressTracker,
    }

    fn fixture(total: u64, workers: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let part = crate::storage::part_path(&output);
        let mut builder = StorageWriterBuilder::create(&part).unwrap();
        builder.preallocate(total).unwrap();
        let mut checkpoint = CheckpointStore::for_output(&output);
        checkpoint.create_new(&partition(total, workers)).unwrap();
        let progress = ProgressTracker::new();
        progress.begin(total, &vec![0; workers]);
        Fixture {
            _dir: dir,
            part,
            storage: builder.build(),
            checkpoint,
            cancel: CancelToken::new(),
            progress,
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn ctx<'a>(f: &'a Fixture, client: &'a FakeClient, policy: RetryPolicy) -> WorkerContext<'a> {
        WorkerContext {
            url: "http://fake/file.bin",
            client,
            storage: &f.storage,
            checkpoint: &f.checkpoint,
            policy,
            cancel: &f.cancel,
            progress: Some(&f.progress),
        }
    }

    fn stored_resume(f: &Fixture, workers: usize, worker: usize) -> u64 {
        let mut reader = f.checkpoint.clone();
        reader.load(workers).unwrap().entries[worker].resume_offset
    }

    #[test]
    fn downloads_its_range_and_updates_checkpoint() {
        let data = body(1000);
        let f = fixture(1000, 3);
        let client = FakeClient::new(data.clone());
        let range = partition(1000, 3).ranges[1];

        let report = ChunkWorker::new(1, range, range.start).run(&ctx(&f, &client, fast_policy(3)));

        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(report.resume_offset, 668);
        assert_eq!(stored_resume(&f, 3, 1), 668);
        assert_eq!(stored_resume(&f, 3, 0), 0, "other slots untouched");
        assert_eq!(stored_resume(&f, 3, 2), 668, "other slots untouched");
        let on_disk = std::fs::read(&f.part).unwrap();
        assert_eq!(&on_disk[334..668], &data[334..668]);
        assert!(on_disk[..334].iter().all(|&b| b == 0));
        assert_eq!(f.progress.snapshot().bytes_done, 334);
    }

    #[test]
    fn empty_or_finished_range_needs_no_request() {
        let f = fixture(2, 4);
        let client = FakeClient::new(body(2));
        let plan = partition(2, 4);

        let empty = ChunkWorker::new(3, plan.ranges[3], plan.ranges[3].start);
        assert_eq!(empty.run(&ctx(&f, &client, fast_policy(3))).outcome, WorkerOutcome::Done);
        let finished = ChunkWorker::new(0, plan.ranges[0], 1);
        assert_eq!(finished.run(&ctx(&f, &client, fast_policy(3))).outcome, WorkerOutcome::Done);
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn resumes_from_current_offset() {
        let data = body(1000);
        let f = fixture(1000, 1);
        let client = FakeClient::new(data.clone());
        let range = ByteRange::new(0, 999);

        let report = ChunkWorker::new(0, range, 600).run(&ctx(&f, &client, fast_policy(3)));

        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(*client.requests.lock().unwrap(), vec![ByteRange::new(600, 999)]);
        let on_disk = std::fs::read(&f.part).unwrap();
        assert_eq!(&on_disk[600..], &data[600..]);
    }

    #[test]
    fn early_close_is_retried_from_resume_offset() {
        let data = body(1000);
        let f = fixture(1000, 1);
        let client = FakeClient::new(data.clone())
            .block_size(100)
            .script(&[Fault::CutAfter(300), Fault::CutAfter(200)]);
        let range = ByteRange::new(0, 999);

        let report = ChunkWorker::new(0, range, 0).run(&ctx(&f, &client, fast_policy(2)));

        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(
            *client.requests.lock().unwrap(),
            vec![
                ByteRange::new(0, 999),
                ByteRange::new(300, 999),
                ByteRange::new(500, 999),
            ]
        );
        assert_eq!(std::fs::read(&f.part).unwrap(), data);
        assert_eq!(stored_resume(&f, 1, 0), 1000);
    }

    #[test]
    fn short_successful_stream_is_retried() {
        let data = body(1000);
        let f = fixture(1000, 1);
        let client = FakeClient::new(data.clone())
            .block_size(100)
            .script(&[Fault::ShortOk(300), Fault::ShortOk(0)]);

        let report =
            ChunkWorker::new(0, ByteRange::new(0, 999), 0).run(&ctx(&f, &client, fast_policy(3)));

        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(
            *client.requests.lock().unwrap(),
            vec![
                ByteRange::new(0, 999),
                ByteRange::new(300, 999),
                ByteRange::new(300, 999),
            ]
        );
        assert_eq!(std::fs::read(&f.part).unwrap(), data);
        assert_eq!(stored_resume(&f, 1, 0), 1000);
    }

    #[test]
    fn short_stream_without_progress_exhausts_budget() {
        let f = fixture(400, 1);
        let client = FakeClient::new(body(400))
            .script(&[Fault::ShortOk(0), Fault::ShortOk(0), Fault::ShortOk(0)]);

        let report =
            ChunkWorker::new(0, ByteRange::new(0, 399), 0).run(&ctx(&f, &client, fast_policy(3)));

        assert!(matches!(report.outcome, WorkerOutcome::Failed(ref m) if m.contains("incomplete")));
        assert_eq!(report.resume_offset, 0);
        assert_eq!(client.request_count(), 3);
    }

    #[test]
    fn unrecorded_block_does_not_count_as_done() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let part = crate::storage::part_path(&output);
        let mut builder = StorageWriterBuilder::create(&part).unwrap();
        builder.preallocate(100).unwrap();
        let storage = builder.build();
        // Never opened, so every update fails.
        let checkpoint = CheckpointStore::for_output(&output);
        let cancel = CancelToken::new();
        let client = FakeClient::new(body(100)).block_size(100);
        let ctx = WorkerContext {
            url: "http://fake/out.bin",
            client: &client,
            storage: &storage,
            checkpoint: &checkpoint,
            policy: fast_policy(3),
            cancel: &cancel,
            progress: None,
        };

        let report = ChunkWorker::new(0, ByteRange::new(0, 99), 0).run(&ctx);

        assert!(matches!(report.outcome, WorkerOutcome::Failed(ref m) if m.contains("checkpoint")));
        assert_eq!(report.resume_offset, 0);
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn transient_status_is_retried_within_budget() {
        let data = body(500);
        let f = fixture(500, 1);
        let client = FakeClient::new(data.clone()).script(&[Fault::Status(503), Fault::Status(502)]);

        let report =
            ChunkWorker::new(0, ByteRange::new(0, 499), 0).run(&ctx(&f, &client, fast_policy(3)));

        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(client.request_count(), 3);
        assert_eq!(std::fs::read(&f.part).unwrap(), data);
    }

    #[test]
    fn fails_after_retry_budget_without_progress() {
        let f = fixture(500, 1);
        let client = FakeClient::new(body(500)).poison(0, 500);

        let report =
            ChunkWorker::new(0, ByteRange::new(0, 499), 0).run(&ctx(&f, &client, fast_policy(4)));

        assert!(matches!(report.outcome, WorkerOutcome::Failed(ref m) if m.contains("500")));
        assert_eq!(client.request_count(), 4);
        assert_eq!(stored_resume(&f, 1, 0), 0);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let f = fixture(500, 1);
        let client = FakeClient::new(body(500)).script(&[Fault::Status(404)]);

        let report =
            ChunkWorker::new(0, ByteRange::new(0, 499), 0).run(&ctx(&f, &client, fast_policy(5)));

        assert!(matches!(report.outcome, WorkerOutcome::Failed(_)));
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn stops_at_block_boundary_with_checkpoint_in_sync() {
        let data = body(1000);
        let f = fixture(1000, 1);
        let client = FakeClient::new(data.clone())
            .block_size(100)
            .cancel_after(3, f.cancel.clone());

        let report =
            ChunkWorker::new(0, ByteRange::new(0, 999), 0).run(&ctx(&f, &client, fast_policy(3)));

        assert_eq!(report.outcome, WorkerOutcome::Stopped);
        let resume = stored_resume(&f, 1, 0);
        assert_eq!(resume, report.resume_offset);
        assert_eq!(resume % 100, 0, "stopped on a block boundary");
        assert!(resume > 0 && resume < 1000);
        let on_disk = std::fs::read(&f.part).unwrap();
        assert_eq!(&on_disk[..resume as usize], &data[..resume as usize]);
    }

    #[test]
    fn cancelled_before_start_makes_no_request() {
        let f = fixture(100, 1);
        f.cancel.cancel();
        let client = FakeClient::new(body(100));
        let report =
            ChunkWorker::new(0, ByteRange::new(0, 99), 0).run(&ctx(&f, &client, fast_policy(3)));
        assert_eq!(report.outcome, WorkerOutcome::Stopped);
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn new_clamps_resume_offset_into_range() {
        let w = ChunkWorker::new(0, ByteRange::new(10, 19), 0);
        assert_eq!(w.resume_offset(), 10);
        assert_eq!(w.state(), WorkerState::Pending);
        let w = ChunkWorker::new(0, ByteRange::new(10, 19), 99);
        assert_eq!(w.resume_offset(), 20);
    }
}
