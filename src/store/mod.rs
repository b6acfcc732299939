// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filesystem store for uploaded images

use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image already stored: {0}")]
    AlreadyExists(String),
    #[error("Invalid image name: {0}")]
    InvalidName(String),
}

/// Directory of uploaded images keyed by storage filename.
/// Images are written once and never modified.
#[derive(Debug, Clone)]
pub struct ImageStore {
    base_path: PathBuf,
}

impl ImageStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn dir(&self) -> &Path {
        &self.base_path
    }

    /// Absolute location of a stored image
    pub fn path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Write a new image. Fails with `AlreadyExists` instead of overwriting.
    pub async fn put(&self, name: &str, data: Bytes) -> Result<PathBuf, ImageStoreError> {
        validate_name(name)?;
        let path = self.path(name);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ImageStoreError::AlreadyExists(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&data).await?;
        file.sync_all().await?;
        Ok(path)
    }
}

/// Names must be a single path component
fn validate_name(name: &str) -> Result<(), ImageStoreError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(ImageStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
