//! Crash-safe file replacement: write to a sibling temp file, fsync, rename.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` with `data` atomically so readers never observe a
/// truncated file, even if the process dies mid-write.
pub(crate) fn replace_file_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }
    let mut temp = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new()?,
    };
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
