//! Concurrent positioned writer for the part file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Writer for the part file. Cheap to clone; every clone shares one handle and
/// each `write_at` is independent of any file cursor (pwrite-style).
#[derive(Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    part_path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_file_and_path(file: File, part_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            part_path,
        }
    }

    /// Open an existing part file for resume (read+write, no truncation).
    pub fn open_existing(part_path: &Path) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(part_path)?;
        Ok(Self::from_file_and_path(file, part_path.to_path_buf()))
    }

    /// Write all of `data` at `offset` without touching any shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Windows fallback: positioned writes via `seek_write`, looping on short writes.
    #[cfg(windows)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut written = 0usize;
        while written < data.len() {
            let n = self
                .file
                .seek_write(&data[written..], offset + written as u64)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
            }
            written += n;
        }
        Ok(())
    }

    /// Current on-disk length of the part file.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Flush file data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Atomically rename the part file to `final_path`. Consumes this handle;
    /// call `sync` first. Fails if `final_path` is on a different filesystem.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let part_path = self.part_path;
        drop(self.file);
        std::fs::rename(&part_path, final_path)
    }
}
