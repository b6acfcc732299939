// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Emotiscope: facial emotion analysis web app
//!
//! Uploaded photos are stored on disk, classified by a local vision model, and
//! recorded in SQLite so the history page can list every analysis.

pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod ollama;
pub mod pipeline;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use error::{EmotiscopeError, Result};
