//! Persistence helpers
//!
//! Whole-file replacement for index dumps, buffered readers for restores, and
//! preallocation of container data files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Write `data` to `<path>.tmp`, sync it, then rename it over `path`.
///
/// A crash before the rename leaves the previous file intact.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    // Make the rename itself durable
    if let Some(dir) = path.parent() {
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Buffered reader for incremental parsing
pub fn open_reader(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

/// Extend `file` to `size` bytes of reserved space
pub fn preallocate(file: &File, size: u64) -> Result<()> {
    if size == 0 || file.metadata()?.len() >= size {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor stays valid for the lifetime of `file`
        let rc = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
        if rc == 0 {
            return Ok(());
        }
        tracing::debug!("posix_fallocate failed ({}), extending by truncate", rc);
    }

    file.set_len(size)?;
    file.write_all_at(&[0u8], size - 1)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
