// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tessel_render::AssetStore;
use tracing::debug;

/// Reads and writes assets relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsAssets {
    root: PathBuf,
}

impl FsAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl AssetStore for FsAssets {
    fn read(&self, path: &Path) -> Vec<u8> {
        let full = self.resolve(path);
        match fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("asset {} unreadable: {e}", full.display());
                Vec::new()
            }
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&full, bytes).with_context(|| format!("write {}", full.display()))
    }
}
