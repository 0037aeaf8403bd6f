// ABOUTME: Per-module idempotency marker recording the version that last succeeded.
// ABOUTME: A marker matching the current version lets a module skip all work.

use super::ModuleKind;
use crate::context::Layout;
use crate::files::{self, MODE_PUBLIC};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct IdempotencyMarker {
    path: PathBuf,
}

impl IdempotencyMarker {
    pub fn new(layout: &Layout, module: ModuleKind) -> Self {
        Self {
            path: layout
                .markers_dir()
                .join(format!("{}.marker", module.name())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored version, or `None` if the module never completed.
    pub fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let version = contents.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn matches(&self, version: &str) -> io::Result<bool> {
        Ok(self.read()?.as_deref() == Some(version))
    }

    pub fn write(&self, version: &str) -> io::Result<()> {
        files::write_atomic(&self.path, format!("{version}\n").as_bytes(), MODE_PUBLIC)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_marker_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let marker = IdempotencyMarker::new(&Layout::new(dir.path()), ModuleKind::Cache);
        assert_eq!(marker.read().unwrap(), None);
        assert!(!marker.matches("1.0.0").unwrap());
    }

    #[test]
    fn written_marker_matches_only_its_version() {
        let dir = TempDir::new().unwrap();
        let marker = IdempotencyMarker::new(&Layout::new(dir.path()), ModuleKind::Database);
        marker.write("1.0.0").unwrap();

        assert!(marker.matches("1.0.0").unwrap());
        assert!(!marker.matches("1.0.1").unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join(".deploy/markers/database.marker")).unwrap(),
            "1.0.0\n"
        );
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let marker = IdempotencyMarker::new(&Layout::new(dir.path()), ModuleKind::Init);
        marker.write("v1").unwrap();
        marker.clear().unwrap();
        marker.clear().unwrap();
        assert_eq!(marker.read().unwrap(), None);
    }
}
