// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Emotion inference collaborators
//!
//! The upload pipeline only sees the [`EmotionAnalyzer`] trait: given a stored
//! image it either names the dominant emotion, reports that no face was found,
//! or fails. Failures never escape the pipeline; they become [`ANALYSIS_ERROR`].

pub mod vision;

use async_trait::async_trait;
use std::path::Path;

use crate::Result;

pub use vision::OllamaEmotionAnalyzer;

/// Result label recorded when no face was found
pub const NO_FACE_DETECTED: &str = "No face detected";

/// Result label recorded when the collaborator failed
pub const ANALYSIS_ERROR: &str = "Analysis error";

/// Emotion labels the classifier is asked to choose from
pub const EMOTIONS: &[&str] = &["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];

/// Non-error answers from an emotion analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmotionOutcome {
    /// Dominant emotion of the detected face, as reported by the model
    Emotion(String),
    /// The image contains no face. Not an error.
    NoFace,
}

/// Trait for emotion inference backends
#[async_trait]
pub trait EmotionAnalyzer: Send + Sync {
    /// Name of this analyzer
    fn name(&self) -> &'static str;

    /// Classify the dominant emotion of the face in the image at `path`
    async fn analyze(&self, path: &Path) -> Result<EmotionOutcome>;
}

/// Map an analyzer answer onto the label stored with the record
pub fn result_label(outcome: &Result<EmotionOutcome>) -> String {
    match outcome {
        Ok(EmotionOutcome::Emotion(label)) if !label.trim().is_empty() => capitalize(label.trim()),
        Ok(EmotionOutcome::Emotion(_)) => ANALYSIS_ERROR.to_string(),
        Ok(EmotionOutcome::NoFace) => NO_FACE_DETECTED.to_string(),
        Err(_) => ANALYSIS_ERROR.to_string(),
    }
}

/// First character upper-cased, the rest lower-cased
pub fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Interpret a free-text model reply as an emotion outcome
pub fn parse_emotion_reply(raw: &str) -> Result<EmotionOutcome> {
    let reply = raw.trim().to_lowercase();

    if reply.contains("no face") || reply.contains("no human face") {
        return Ok(EmotionOutcome::NoFace);
    }

    let words: Vec<&str> = reply
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    if words.first() == Some(&"none") {
        return Ok(EmotionOutcome::NoFace);
    }

    words
        .iter()
        .find_map(|w| normalize_emotion(w))
        .map(|e| EmotionOutcome::Emotion(e.to_string()))
        .ok_or_else(|| {
            crate::EmotiscopeError::Inference(format!("Unrecognized model reply: {}", raw.trim()))
        })
}

fn normalize_emotion(word: &str) -> Option<&'static str> {
    let emotion = match word {
        "angry" | "anger" | "mad" => "angry",
        "disgust" | "disgusted" => "disgust",
        "fear" | "fearful" | "afraid" | "scared" => "fear",
        "happy" | "happiness" | "joy" | "joyful" => "happy",
        "sad" | "sadness" | "unhappy" => "sad",
        "surprise" | "surprised" => "surprise",
        "neutral" | "calm" => "neutral",
        _ => return None,
    };
    Some(emotion)
}
