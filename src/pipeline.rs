// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Upload pipeline: validate, store, analyze, record
//!
//! Each step returns an explicit [`UploadError`] variant so the web layer can
//! choose between a redirect back to the form and a server error. Inference
//! failures are not errors here; they are recorded as [`ANALYSIS_ERROR`].
//!
//! [`ANALYSIS_ERROR`]: crate::inference::ANALYSIS_ERROR

use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::db::Database;
use crate::inference::{result_label, EmotionAnalyzer};
use crate::store::{ImageStore, ImageStoreError};

/// Name recorded when the submitter leaves the name field blank
pub const ANONYMOUS: &str = "Anonymous";

/// Fallback base name when sanitizing leaves nothing usable
const FALLBACK_BASE_NAME: &str = "upload";

const STORAGE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Source of the timestamp prefixed to storage names
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No selected file")]
    MissingFile,
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// A file attachment as submitted. `file_name` is empty when the browser
/// sent the field without selecting a file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// A submitted upload form
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub name: Option<String>,
    pub file: Option<UploadedFile>,
}

/// A completed analysis, handed back to the web layer for redirection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub id: i64,
    pub filename: String,
    pub result: String,
}

pub struct UploadPipeline {
    images: ImageStore,
    db: Database,
    analyzer: Arc<dyn EmotionAnalyzer>,
    allowed_extensions: Vec<String>,
    clock: Clock,
}

impl UploadPipeline {
    pub fn new(
        images: ImageStore,
        db: Database,
        analyzer: Arc<dyn EmotionAnalyzer>,
        allowed_extensions: &[String],
    ) -> Self {
        Self {
            images,
            db,
            analyzer,
            allowed_extensions: allowed_extensions.iter().map(|e| e.to_lowercase()).collect(),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the wall clock used for storage names
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Run one submission through the whole pipeline
    pub async fn process(&self, form: UploadForm) -> Result<UploadOutcome, UploadError> {
        let file = form
            .file
            .filter(|f| !f.file_name.is_empty())
            .ok_or(UploadError::MissingFile)?;

        let extension = allowed_file(&file.file_name, &self.allowed_extensions)
            .ok_or_else(|| UploadError::UnsupportedFileType(file.file_name.clone()))?;

        let base_name = safe_base_name(&file.file_name, &extension);
        let (filename, path) = self.store_image(&base_name, file.data).await?;

        let outcome = self.analyzer.analyze(&path).await;
        if let Err(e) = &outcome {
            warn!("Emotion analysis failed for {} ({}): {}", filename, self.analyzer.name(), e);
        }
        let result = result_label(&outcome);

        let user_name = form
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(ANONYMOUS);

        let id = self
            .db
            .insert_analysis(user_name, &filename, &result)
            .map_err(|e| {
                error!("Failed to record analysis for {}: {}", filename, e);
                UploadError::StorageUnavailable(e.to_string())
            })?;

        info!(id, filename = %filename, result = %result, "Analysis recorded");

        Ok(UploadOutcome { id, filename, result })
    }

    /// Write the bytes under a fresh storage name. A same-second clash with an
    /// identically named upload gets a random suffix instead of overwriting.
    async fn store_image(&self, base_name: &str, data: Bytes) -> Result<(String, PathBuf), UploadError> {
        let filename = storage_name((self.clock)(), base_name);

        match self.images.put(&filename, data.clone()).await {
            Ok(path) => Ok((filename, path)),
            Err(ImageStoreError::AlreadyExists(_)) => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                let filename = with_suffix(&filename, &suffix[..8]);
                warn!("Storage name collision, retrying as {}", filename);
                let path = self.images.put(&filename, data).await.map_err(storage_error)?;
                Ok((filename, path))
            }
            Err(e) => Err(storage_error(e)),
        }
    }
}

fn storage_error(e: ImageStoreError) -> UploadError {
    error!("Failed to store image: {}", e);
    UploadError::StorageUnavailable(e.to_string())
}

/// Lower-cased extension if `filename` has one in the allow-set
pub fn allowed_file(filename: &str, allowed: &[String]) -> Option<String> {
    let (_, extension) = filename.rsplit_once('.')?;
    let extension = extension.to_lowercase();
    allowed.iter().any(|a| *a == extension).then_some(extension)
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Accented letters are decomposed (NFKD) down to their ASCII base letter.
/// Path separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped, and leading/trailing `.`/`_` are
/// stripped. The result may be empty.
pub fn secure_filename(filename: &str) -> String {
    let decomposed: String = filename.nfkd().filter(char::is_ascii).collect();
    let spaced = decomposed.replace(['/', '\\'], " ");

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Sanitized name that still carries a stem and the validated extension
pub fn safe_base_name(filename: &str, extension: &str) -> String {
    let secured = secure_filename(filename);
    match secured.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.eq_ignore_ascii_case(extension) => secured,
        _ => format!("{}.{}", FALLBACK_BASE_NAME, extension),
    }
}

/// `<YYYYmmddHHMMSS>_<base_name>`
pub fn storage_name(at: NaiveDateTime, base_name: &str) -> String {
    format!("{}_{}", at.format(STORAGE_TIMESTAMP_FORMAT), base_name)
}

fn with_suffix(filename: &str, suffix: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", filename, suffix),
    }
}
