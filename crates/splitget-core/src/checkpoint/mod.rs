//! Durable per-worker progress for resume.
//!
//! One fixed-size slot per worker holds `(resume_offset, end_offset)`; see
//! [`layout`] for the byte layout. Workers update only the resume field of
//! their own slot with a single positioned write, so concurrent updates need
//! no locking and never tear another worker's record.

mod error;
mod layout;

pub use error::CheckpointError;

use std::io;
use std::path::{Path, PathBuf};

use crate::segmenter::{ByteRange, DownloadPlan};
use crate::storage::{StorageWriter, StorageWriterBuilder};

/// Suffix of the checkpoint file next to the output path.
pub const CHECKPOINT_SUFFIX: &str = ".ckpt";

/// Path of the checkpoint for `output` (e.g. `file.iso` → `file.iso.ckpt`).
pub fn checkpoint_path(output: &Path) -> PathBuf {
    let mut o = output.as_os_str().to_owned();
    o.push(CHECKPOINT_SUFFIX);
    PathBuf::from(o)
}

/// Progress record of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub worker_id: usize,
    /// Next byte to fetch. Equals `end_offset + 1` once the worker is done.
    pub resume_offset: u64,
    /// Last byte of the worker's range (inclusive). Never changes.
    pub end_offset: u64,
}

impl CheckpointEntry {
    pub fn is_finished(&self) -> bool {
        self.resume_offset == self.end_offset.wrapping_add(1)
    }
}

/// Snapshot of every worker's progress for one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub total_length: u64,
    pub entries: Vec<CheckpointEntry>,
}

impl Checkpoint {
    fn from_plan(plan: &DownloadPlan) -> Self {
        let entries = plan
            .ranges
            .iter()
            .enumerate()
            .map(|(worker_id, r)| CheckpointEntry {
                worker_id,
                resume_offset: r.start,
                end_offset: r.end,
            })
            .collect();
        Checkpoint {
            total_length: plan.total_length,
            entries,
        }
    }

    /// Rebuild the ranges: each range starts right after the previous one's end.
    pub fn plan(&self) -> DownloadPlan {
        let mut start = 0u64;
        let ranges = self
            .entries
            .iter()
            .map(|e| {
                let r = ByteRange::new(start, e.end_offset);
                start = e.end_offset.saturating_add(1);
                r
            })
            .collect();
        DownloadPlan {
            total_length: self.total_length,
            ranges,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.entries.iter().all(CheckpointEntry::is_finished)
    }

    /// Bytes already persisted across all workers.
    pub fn bytes_done(&self) -> u64 {
        self.plan()
            .ranges
            .iter()
            .zip(&self.entries)
            .map(|(r, e)| e.resume_offset.saturating_sub(r.start))
            .sum()
    }

    /// Checks every entry invariant and that the ranges partition the resource.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.total_length == 0 {
            return Err(CheckpointError::corrupt("total length is zero"));
        }
        let mut start = 0u64;
        for e in &self.entries {
            let end_excl = e
                .end_offset
                .checked_add(1)
                .ok_or_else(|| CheckpointError::corrupt("end offset overflows"))?;
            if start > end_excl {
                return Err(CheckpointError::corrupt(format!(
                    "worker {} range starts at {} past its end {}",
                    e.worker_id, start, e.end_offset
                )));
            }
            if e.resume_offset < start || e.resume_offset > end_excl {
                return Err(CheckpointError::corrupt(format!(
                    "worker {} resume offset {} outside [{}, {}]",
                    e.worker_id, e.resume_offset, start, end_excl
                )));
            }
            start = end_excl;
        }
        if start != self.total_length {
            return Err(CheckpointError::corrupt(format!(
                "ranges cover {} bytes, resource has {}",
                start, self.total_length
            )));
        }
        Ok(())
    }
}

/// File-backed checkpoint store. Clones share the open handle, so one clone
/// per worker can call `update` concurrently.
#[derive(Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    slots: Option<(StorageWriter, usize)>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slots: None,
        }
    }

    /// Store for the download written to `output`.
    pub fn for_output(output: &Path) -> Self {
        Self::new(checkpoint_path(output))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and validate the stored checkpoint, then open it for updates.
    /// Fails with `Corrupt` if the stored worker count differs from `worker_count`.
    pub fn load(&mut self, worker_count: usize) -> Result<Checkpoint, CheckpointError> {
        let bytes = std::fs::read(&self.path)?;
        let header = layout::decode_header(&bytes)?;
        if header.worker_count as usize != worker_count {
            return Err(CheckpointError::corrupt(format!(
                "stored worker count {} does not match requested {}",
                header.worker_count, worker_count
            )));
        }
        let expected_len = layout::file_len(worker_count);
        if bytes.len() as u64 != expected_len {
            return Err(CheckpointError::corrupt(format!(
                "file is {} bytes, expected {}",
                bytes.len(),
                expected_len
            )));
        }
        let checkpoint = Checkpoint {
            total_length: header.total_length,
            entries: layout::decode_slots(&bytes, worker_count),
        };
        checkpoint.validate()?;

        let writer = StorageWriter::open_existing(&self.path)?;
        self.slots = Some((writer, worker_count));
        tracing::debug!(
            path = %self.path.display(),
            workers = worker_count,
            total = checkpoint.total_length,
            "loaded checkpoint"
        );
        Ok(checkpoint)
    }

    /// Write a fresh checkpoint for `plan` (every worker at its range start),
    /// replacing any previous file, and open it for updates.
    pub fn create_new(&mut self, plan: &DownloadPlan) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint::from_plan(plan);
        let bytes = layout::encode(checkpoint.total_length, &checkpoint.entries)?;

        let writer = StorageWriterBuilder::create(&self.path)?.build();
        writer.write_at(0, &bytes)?;
        writer.sync()?;
        self.slots = Some((writer, checkpoint.entries.len()));
        tracing::debug!(
            path = %self.path.display(),
            workers = checkpoint.entries.len(),
            total = checkpoint.total_length,
            "created checkpoint"
        );
        Ok(checkpoint)
    }

    /// Overwrite the resume offset of `worker`'s slot. Touches no other bytes.
    pub fn update(&self, worker: usize, resume_offset: u64) -> Result<(), CheckpointError> {
        let (writer, worker_count) = self.slots.as_ref().ok_or(CheckpointError::NotOpen)?;
        if worker >= *worker_count {
            return Err(CheckpointError::UnknownWorker {
                worker,
                worker_count: *worker_count,
            });
        }
        writer.write_at(
            layout::resume_field_offset(worker),
            &resume_offset.to_be_bytes(),
        )?;
        Ok(())
    }

    /// Flush slot updates to disk.
    pub fn sync(&self) -> Result<(), CheckpointError> {
        if let Some((writer, _)) = &self.slots {
            writer.sync()?;
        }
        Ok(())
    }

    /// Remove the checkpoint file. A missing file is not an error.
    pub fn delete(&mut self) -> Result<(), CheckpointError> {
        self.slots = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
