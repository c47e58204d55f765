// SPDX-License-Identifier: CEPL-1.0
//! Byte-level asset access used for shader binaries and the pipeline cache blob.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub trait AssetStore {
    /// Returns the file contents, or an empty buffer when the asset is
    /// missing or unreadable. Callers decide whether empty is fatal.
    fn read(&self, path: &Path) -> Vec<u8>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
}

/// In-memory store keyed by path.
#[derive(Debug, Default)]
pub struct MemoryAssets {
    files: RefCell<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.borrow_mut().insert(path.into(), bytes.into());
        self
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }
}

impl AssetStore for MemoryAssets {
    fn read(&self, path: &Path) -> Vec<u8> {
        self.get(path).unwrap_or_default()
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }
}

impl<T: AssetStore + ?Sized> AssetStore for std::rc::Rc<T> {
    fn read(&self, path: &Path) -> Vec<u8> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        (**self).write(path, bytes)
    }
}
