//! Shared offset writer over a `.part` file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use super::builder::with_path;

/// Handle to a `.part` file. Cloning is cheap; every clone writes through the
/// same descriptor with positional writes, so segments never share a cursor.
#[derive(Debug, Clone)]
pub struct PartFile {
    file: Arc<File>,
    temp_path: PathBuf,
}

impl PartFile {
    pub(crate) fn from_file_and_path(file: File, temp_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
        }
    }

    /// Reopen a `.part` file left by a failed run, without truncating it.
    pub fn open_existing(temp_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(temp_path)
            .map_err(|e| with_path(e, "open", temp_path))?;
        Ok(Self::from_file_and_path(file, temp_path.to_path_buf()))
    }

    /// Write all of `data` at `offset`.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Seek + write fallback. Not safe for concurrent use.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file
            .sync_all()
            .map_err(|e| with_path(e, "sync", &self.temp_path))
    }

    /// Current size on disk.
    pub fn on_disk_len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Rename the temp file onto `final_path`. Consumes this handle; other
    /// clones must already be dropped for the rename to be meaningful.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let Self { file, temp_path } = self;
        drop(file);
        std::fs::rename(&temp_path, final_path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("rename {} to {}: {e}", temp_path.display(), final_path.display()),
            )
        })
    }
}
