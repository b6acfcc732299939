// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Emotion analyzer backed by an Ollama vision model

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{parse_emotion_reply, EmotionAnalyzer, EmotionOutcome};
use crate::config::EngineConfig;
use crate::ollama::OllamaClient;
use crate::{EmotiscopeError, Result};

/// Longest side, in pixels, of the image sent to the model
const MAX_DIMENSION: u32 = 1024;

/// Analyzer that asks a local vision model for the dominant emotion
pub struct OllamaEmotionAnalyzer {
    client: OllamaClient,
    model: String,
    prompt: String,
}

impl OllamaEmotionAnalyzer {
    pub fn new(engine: &EngineConfig) -> Result<Self> {
        let client = OllamaClient::new(&engine.url, Duration::from_secs(engine.timeout_secs))?;
        Ok(Self {
            client,
            model: engine.model.clone(),
            prompt: engine.prompt.clone(),
        })
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    /// Decode, downscale, and re-encode as JPEG. Decoding failures are errors.
    fn prepare_image(path: &Path) -> Result<Vec<u8>> {
        let img = image::open(path)?;

        let img = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
            img.resize(MAX_DIMENSION, MAX_DIMENSION, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        // JPEG has no alpha channel
        let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        match rgb.write_to(&mut cursor, image::ImageFormat::Jpeg) {
            Ok(()) => Ok(buffer),
            Err(e) => {
                debug!("JPEG re-encode failed ({}), sending original bytes", e);
                Ok(std::fs::read(path)?)
            }
        }
    }

    async fn encode_image(path: &Path) -> Result<String> {
        let path: PathBuf = path.to_path_buf();
        let data = tokio::task::spawn_blocking(move || Self::prepare_image(&path))
            .await
            .map_err(|e| EmotiscopeError::Inference(format!("Image preparation task failed: {}", e)))??;
        Ok(general_purpose::STANDARD.encode(&data))
    }
}

#[async_trait]
impl EmotionAnalyzer for OllamaEmotionAnalyzer {
    fn name(&self) -> &'static str {
        "ollama-vision"
    }

    async fn analyze(&self, path: &Path) -> Result<EmotionOutcome> {
        info!("Analyzing image at: {:?}", path);

        let image_data = Self::encode_image(path).await?;

        let reply = self
            .client
            .generate_with_image(&self.model, &self.prompt, image_data)
            .await?;
        debug!("Vision model replied: {:?}", reply);

        let outcome = parse_emotion_reply(&reply)?;
        match &outcome {
            EmotionOutcome::Emotion(emotion) => info!("Dominant emotion detected: {}", emotion),
            EmotionOutcome::NoFace => warn!("No face detected in {:?}", path),
        }
        Ok(outcome)
    }
}
