// ABOUTME: Atomic file writes with explicit permissions.
// ABOUTME: Every generated artifact goes through here so failures never leave partial files.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Owner read/write only.
pub const MODE_PRIVATE: u32 = 0o600;
/// World readable.
pub const MODE_PUBLIC: u32 = 0o644;
/// Owner-only directory.
pub const MODE_PRIVATE_DIR: u32 = 0o700;

/// Write `contents` to `path` via a sibling temp file and rename.
///
/// The temp file is created with `mode` before any bytes are written, so secret
/// material is never briefly world-readable.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let tmp = temp_path(path);
    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp)?;
        // mode() is filtered by umask and ignored for pre-existing files
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Write only when the content differs; returns whether a write happened.
pub fn write_if_changed(path: &Path, contents: &[u8], mode: u32) -> io::Result<bool> {
    match fs::read(path) {
        Ok(existing) if existing == contents => {
            ensure_mode(path, mode)?;
            Ok(false)
        }
        _ => write_atomic(path, contents, mode).map(|()| true),
    }
}

/// Copy a file atomically, applying `mode` to the destination.
pub fn copy_atomic(from: &Path, to: &Path, mode: u32) -> io::Result<()> {
    let contents = fs::read(from)?;
    write_atomic(to, &contents, mode)
}

/// Create a directory (and parents) and force its permission bits.
pub fn create_dir_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::create_dir_all(path)?;
    ensure_mode(path, mode)
}

fn ensure_mode(path: &Path, mode: u32) -> io::Result<()> {
    let current = fs::metadata(path)?.permissions().mode() & 0o777;
    if current != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_sets_mode_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("secret");

        write_atomic(&path, b"value", MODE_PRIVATE).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"value");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, MODE_PRIVATE);
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn write_if_changed_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf");

        assert!(write_if_changed(&path, b"a", MODE_PUBLIC).unwrap());
        assert!(!write_if_changed(&path, b"a", MODE_PUBLIC).unwrap());
        assert!(write_if_changed(&path, b"b", MODE_PUBLIC).unwrap());
    }

    #[test]
    fn write_atomic_tightens_existing_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_atomic(&path, b"new", MODE_PRIVATE).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, MODE_PRIVATE);
    }
}
