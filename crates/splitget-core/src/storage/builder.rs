//! Builder for creating and preallocating the part file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a fresh part file. Call `preallocate` then `build` to get
/// a `StorageWriter` that supports concurrent `write_at` from multiple workers.
pub struct StorageWriterBuilder {
    file: File,
    part_path: PathBuf,
}

impl StorageWriterBuilder {
    /// Create a new part file at `part_path` (e.g. `output.part`).
    /// Truncates any previous file at that path.
    pub fn create(part_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(part_path)?;
        Ok(StorageWriterBuilder {
            file,
            part_path: part_path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` first; falls
    /// back to `set_len` on failure or non-Unix.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            if size > 0 {
                let fd = self.file.as_raw_fd();
                // SAFETY: fd is a valid, open descriptor owned by `self.file`.
                let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
                if r == 0 {
                    return Ok(());
                }
                tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
            }
        }
        self.file.set_len(size)
    }

    /// Finish building and return a writer that can be shared across workers.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.part_path)
    }
}
