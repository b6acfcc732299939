// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Emotiscope

use thiserror::Error;

/// Result type alias for Emotiscope operations
pub type Result<T> = std::result::Result<T, EmotiscopeError>;

/// Emotiscope error types
#[derive(Error, Debug)]
pub enum EmotiscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Ollama not available: {0}")]
    OllamaUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}
