//! Snapshot directory: where captures and diff artifacts are written

use crate::{compare, Error, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// A directory that has been created (and whose creation has completed)
/// before anything is written into it.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
}

/// A persisted screenshot
#[derive(Debug, Clone)]
pub struct Capture {
    /// File stem, e.g. `large_expected`
    pub name: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of the PNG bytes
    pub digest: String,
    pub path: PathBuf,
}

impl SnapshotDir {
    /// Create `root` (and its parents) if missing.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::env(&root, e))?;
        if !root.is_dir() {
            return Err(Error::env(&root, "not a directory"));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `{name}.png` inside the directory
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.png", name))
    }

    /// Persist PNG bytes as `{name}.png` and describe the capture.
    ///
    /// The bytes are decoded first so a corrupt screenshot is reported before
    /// it lands on disk.
    pub fn write_capture(&self, name: &str, png: Vec<u8>) -> Result<Capture> {
        let (width, height) = compare::decode_png(&png)?.dimensions();
        let path = self.write_png(name, &png)?;
        let digest = hex::encode(Sha256::digest(&png));
        debug!("wrote {} ({}x{}, sha256 {})", path.display(), width, height, digest);
        Ok(Capture {
            name: name.to_string(),
            png,
            width,
            height,
            digest,
            path,
        })
    }

    /// Write raw PNG bytes as `{name}.png`, replacing any previous file.
    pub fn write_png(&self, name: &str, png: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(name);
        fs::write(&path, png).map_err(|e| Error::env(&path, e))?;
        Ok(path)
    }
}
