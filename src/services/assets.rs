//! Vector asset store — flat directory of SVG/JSON drawings.
//!
//! DESIGN
//! ======
//! Assets are plain files in one directory. Every name is reduced to its
//! final path component before touching the file system, so callers cannot
//! read or write outside the store.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("invalid asset name: {0:?}")]
    InvalidName(String),
    #[error("Failed to create folder for assets: {0}")]
    CreateDir(#[source] io::Error),
    #[error("Failed to write {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to index the store.")]
    Index(#[source] io::Error),
}

/// Storage backend for drawing assets. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// Write `content` under `name`, replacing any existing asset.
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] if the name is unusable or the write fails.
    async fn write_asset(&self, name: &str, content: &str) -> Result<(), AssetError>;

    /// Names of every stored asset, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Index`] if the directory cannot be listed.
    async fn get_index(&self) -> Result<Vec<String>, AssetError>;

    /// Location of `name` inside the store.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidName`] if `name` has no final component.
    fn path_for(&self, name: &str) -> Result<PathBuf, AssetError>;
}

/// Reduce a requested name to its final path component.
///
/// # Errors
///
/// Returns [`AssetError::InvalidName`] for empty names, `..`, or bare roots.
pub fn base_name(name: &str) -> Result<&str, AssetError> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AssetError::InvalidName(name.to_owned()))
}

pub struct FileAssetStore {
    directory: PathBuf,
}

impl FileAssetStore {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }
}

#[async_trait::async_trait]
impl AssetStore for FileAssetStore {
    async fn write_asset(&self, name: &str, content: &str) -> Result<(), AssetError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(AssetError::CreateDir)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| AssetError::Write { name: name.to_owned(), source })?;

        info!(path = %path.display(), bytes = content.len(), "assets: wrote file");
        Ok(())
    }

    async fn get_index(&self) -> Result<Vec<String>, AssetError> {
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            warn!(dir = %self.directory.display(), error = %e, "assets: index failed");
            AssetError::Index(e)
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(AssetError::Index)? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, AssetError> {
        Ok(self.directory.join(base_name(name)?))
    }
}

#[cfg(test)]
#[path = "assets_test.rs"]
mod tests;
