//! Creates and preallocates the `.part` file for a new download.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use super::writer::PartFile;

/// A freshly created, not yet shared `.part` file. Size it with
/// [`preallocate`](Self::preallocate), then [`build`](Self::build) a [`PartFile`]
/// that segment workers can write through concurrently.
pub struct PartFileBuilder {
    file: File,
    temp_path: PathBuf,
}

impl PartFileBuilder {
    /// Create (or truncate) the temp file at `temp_path`.
    pub fn create(temp_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)
            .map_err(|e| with_path(e, "create", temp_path))?;
        Ok(Self {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Reserve `size` bytes. Uses `posix_fallocate` on Unix, falling back to
    /// `set_len` when the filesystem refuses it.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, size, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .map_err(|e| with_path(e, "preallocate", &self.temp_path))
    }

    pub fn build(self) -> PartFile {
        PartFile::from_file_and_path(self.file, self.temp_path)
    }
}

pub(super) fn with_path(e: io::Error, op: &str, path: &Path) -> io::Error {
    io::Error::new(e.kind(), format!("{op} {}: {e}", path.display()))
}
