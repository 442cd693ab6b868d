//! Durable output: write finished audio into a directory.
//!
//! Writes go to a temp file in the destination directory and are then
//! renamed into place, so a crash never leaves a truncated WAV behind.

use crate::collaborators::AudioStorage;
use crate::error::ServiceError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// [`AudioStorage`] that writes into a local directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn destination(&self, name: &str) -> Result<PathBuf, ServiceError> {
        let file_name = Path::new(name)
            .file_name()
            .filter(|n| *n == std::ffi::OsStr::new(name))
            .ok_or_else(|| {
                ServiceError::Other(format!("'{}' is not a plain file name", name))
            })?;
        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl AudioStorage for FileStorage {
    async fn persist(&self, bytes: &[u8], destination_name: &str) -> Result<PathBuf, ServiceError> {
        let dest = self.destination(destination_name)?;
        let root = self.root.clone();
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)
                .map_err(|e| ServiceError::Other(format!("{}: {}", root.display(), e)))?;

            let mut tmp = tempfile::NamedTempFile::new_in(&root)
                .map_err(|e| ServiceError::Other(format!("temp file in {}: {}", root.display(), e)))?;
            tmp.write_all(&data)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| ServiceError::Other(format!("writing {}: {}", dest.display(), e)))?;
            tmp.persist(&dest)
                .map_err(|e| ServiceError::Other(format!("renaming into {}: {}", dest.display(), e.error)))?;

            debug!("Wrote {} bytes to {}", data.len(), dest.display());
            Ok(dest)
        })
        .await
        .map_err(|e| ServiceError::Other(format!("Storage task panicked: {}", e)))?
    }
}
