//! Output artifact I/O and file lifecycle.
//!
//! Data lands in `<output>.part`, preallocated to the resource length
//! (fallocate on Unix when available, else set_len). Workers write their own
//! spans concurrently with positioned writes (pwrite); once verified, the
//! part file is atomically renamed to the output path.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

use std::path::{Path, PathBuf};

/// Suffix of the in-progress data file.
pub const PART_SUFFIX: &str = ".part";

/// Path for the in-progress data file: appends `.part` to the output path
/// (e.g. `file.iso` → `file.iso.part`).
pub fn part_path(output: &Path) -> PathBuf {
    let mut o = output.as_os_str().to_owned();
    o.push(PART_SUFFIX);
    PathBuf::from(o)
}

/// Length of the file at `path`, or `None` if it does not exist or is not a regular file.
pub fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}
