//! Concurrent range workers.
//!
//! One OS thread per range, all scoped to a single call of [`run_workers`];
//! returning from it is the completion barrier. Each worker writes only its
//! own byte span of the part file and only its own checkpoint slot.

mod worker;

pub use worker::{ChunkWorker, WorkerContext, WorkerOutcome, WorkerReport, WorkerState};

use std::thread;

/// Run every worker to a terminal state and return their reports in worker order.
/// A worker thread that panics or cannot be spawned is reported as failed.
pub fn run_workers(workers: Vec<ChunkWorker>, ctx: &WorkerContext<'_>) -> Vec<WorkerReport> {
    let resume: Vec<(usize, u64)> = workers
        .iter()
        .map(|w| (w.id(), w.resume_offset()))
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|w| {
                thread::Builder::new()
                    .name(format!("splitget-worker-{}", w.id()))
                    .spawn_scoped(scope, move || w.run(ctx))
            })
            .collect();

        handles
            .into_iter()
            .zip(resume)
            .map(|(handle, (worker, resume_offset))| {
                let failed = |msg: String| {
                    tracing::error!(worker, "{}", msg);
                    WorkerReport {
                        worker,
                        outcome: WorkerOutcome::Failed(msg),
                        resume_offset,
                    }
                };
                match handle {
                    Ok(h) => h
                        .join()
                        .unwrap_or_else(|_| failed("worker thread panicked".to_string())),
                    Err(e) => failed(format!("could not spawn worker thread: {e}")),
                }
            })
            .collect()
    })
}
