//! Atomic file writes: randomized temp sibling, final permission bits, rename.
//!
//! Concurrent readers of the destination never observe a partial file, and
//! concurrent writers of the same destination each rename a complete result —
//! the last rename wins. On any failure the temp file is removed (the guard
//! drops it) and nothing is left at the destination.

use std::io::Write;
use std::path::Path;

/// Permission bits applied to the finished file before the rename.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Write `bytes` to `dest` atomically via a randomized sibling temp file.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(FILE_MODE))?;
    }

    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
