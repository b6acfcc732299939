// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Emotiscope

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// AI engine configuration
    #[serde(default)]
    pub ai_engine: EngineConfig,

    /// Upload handling
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub url: String,
    /// Vision model used for emotion classification
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_emotion_prompt")]
    pub prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    /// Directory holding stored images
    #[serde(default = "default_upload_dir")]
    pub dir: String,
    /// URL prefix the upload directory is served under
    #[serde(default = "default_public_path")]
    pub public_path: String,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_timeout() -> u64 { 120 }
fn default_engine_url() -> String { "http://localhost:11434".to_string() }
fn default_vision_model() -> String { "llava".to_string() }
fn default_upload_dir() -> String { "static/uploads".to_string() }
fn default_public_path() -> String { "/static/uploads".to_string() }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 5000 }
fn default_max_upload_bytes() -> usize { 16 * 1024 * 1024 }
fn default_db_path() -> String { "emotion_app_data.db".to_string() }

fn default_allowed_extensions() -> Vec<String> {
    vec!["png", "jpg", "jpeg"].into_iter().map(String::from).collect()
}

fn default_emotion_prompt() -> String {
    "Look at the most prominent human face in this image and classify its dominant \
     emotion. Answer with exactly one word from: angry, disgust, fear, happy, sad, \
     surprise, neutral. If there is no human face in the image, answer: none."
        .to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_engine: EngineConfig::default(),
            uploads: UploadConfig::default(),
            web: WebConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            model: default_vision_model(),
            timeout_secs: default_timeout(),
            prompt: default_emotion_prompt(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            public_path: default_public_path(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::EmotiscopeError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::Result<()> {
        if self.uploads.allowed_extensions.is_empty() {
            return Err(crate::EmotiscopeError::Config(
                "uploads.allowed_extensions cannot be empty".to_string(),
            ));
        }
        if !self.uploads.public_path.starts_with('/')
            || self.uploads.public_path.trim_end_matches('/').is_empty()
        {
            return Err(crate::EmotiscopeError::Config(format!(
                "uploads.public_path must be an absolute path below '/': {}",
                self.uploads.public_path
            )));
        }
        Ok(())
    }

    /// Public URL for a stored image
    pub fn image_url(&self, filename: &str) -> String {
        format!("{}/{}", self.uploads.public_path.trim_end_matches('/'), filename)
    }
}
