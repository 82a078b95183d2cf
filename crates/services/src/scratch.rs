//! Scoped temporary files for import and export.
//!
//! Everything handed out here deletes itself when dropped, so an early return
//! or error anywhere in a service still leaves the disk clean.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    /// Parent of the per-import work directories
    scratch_dir: PathBuf,
    /// Parent of the per-export archive files
    export_dir: PathBuf,
}

impl ScratchSpace {
    pub fn new(scratch_dir: impl Into<PathBuf>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            export_dir: export_dir.into(),
        }
    }

    /// Both areas under a single directory, as `scratch/` and `exports/`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("scratch"), root.join("exports"))
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// A fresh directory for one import, removed recursively on drop.
    pub fn work_dir(&self, prefix: &str) -> io::Result<TempDir> {
        fs::create_dir_all(&self.scratch_dir)?;
        Builder::new().prefix(prefix).tempdir_in(&self.scratch_dir)
    }

    /// A uniquely named `<map id>_<random>.mind` file, removed on drop.
    pub fn export_file(&self, map_id: Uuid) -> io::Result<NamedTempFile> {
        fs::create_dir_all(&self.export_dir)?;
        Builder::new()
            .prefix(&format!("{map_id}_"))
            .suffix(".mind")
            .tempfile_in(&self.export_dir)
    }
}

impl Default for ScratchSpace {
    fn default() -> Self {
        Self::under(std::env::temp_dir().join("mindmap"))
    }
}
