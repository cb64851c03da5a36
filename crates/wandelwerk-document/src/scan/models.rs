// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR model discovery.
//
// A model directory holds one shared detection model and one recognition model
// per language:
//
//   text-detection.rten           shared by every language
//   text-recognition.rten         English (`eng`), the ocrs default
//   text-recognition-<lang>.rten  any other language
//
// The stock models can be fetched by running `ocrs-cli` once, which caches
// them under `$XDG_CACHE_HOME/ocrs` (typically `~/.cache/ocrs`).

use std::path::{Path, PathBuf};

use wandelwerk_core::error::{Result, WandelwerkError};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_STEM: &str = "text-recognition";

/// Language served by the unsuffixed recognition model.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Default directory for cached OCR model files.
///
/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Model files needed to recognise one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrModelPaths {
    pub language: String,
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl OcrModelPaths {
    /// Where the models for `language` would live inside `dir`.
    pub fn for_language(dir: impl AsRef<Path>, language: &str) -> Self {
        let dir = dir.as_ref();
        let language = language.to_ascii_lowercase();
        let recognition = if language == DEFAULT_LANGUAGE {
            format!("{RECOGNITION_MODEL_STEM}.rten")
        } else {
            format!("{RECOGNITION_MODEL_STEM}-{language}.rten")
        };
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(recognition),
            language,
        }
    }

    /// Verify that both model files exist.
    pub fn validate(&self) -> Result<()> {
        if !self.detection.exists() {
            return Err(WandelwerkError::OcrError(format!(
                "detection model not found at {}; run `ocrs-cli` once to download models",
                self.detection.display()
            )));
        }
        if !self.recognition.exists() {
            return Err(WandelwerkError::OcrError(format!(
                "no recognition model for language '{}' (expected {})",
                self.language,
                self.recognition.display()
            )));
        }
        Ok(())
    }
}
