//! Checkpoint store errors.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Stored state is unreadable or inconsistent with the current download.
    /// Callers discard the checkpoint and start fresh.
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
    /// `update` called before `create_new` or `load` opened the store.
    #[error("checkpoint store is not open")]
    NotOpen,
    #[error("{0} workers do not fit in a checkpoint header")]
    TooManyWorkers(usize),
    #[error("worker {worker} out of range for {worker_count} checkpoint slots")]
    UnknownWorker { worker: usize, worker_count: usize },
    #[error("checkpoint I/O: {0}")]
    Io(#[from] io::Error),
}

impl CheckpointError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        CheckpointError::Corrupt(msg.into())
    }
}
