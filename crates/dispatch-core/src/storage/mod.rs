//! Disk side of a download.
//!
//! The target is written as `<dest>.part`: created and preallocated up front,
//! filled by concurrent positional writes, synced, then renamed onto `<dest>`.
//! The final name never holds a partial file.

mod builder;
mod writer;

use std::path::{Path, PathBuf};

pub use builder::PartFileBuilder;
pub use writer::PartFile;

/// Suffix of in-progress files.
pub const TEMP_SUFFIX: &str = ".part";

/// `file.iso` -> `file.iso.part`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}
