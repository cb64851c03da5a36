// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engine backed by the `ocrs` crate, a pure-Rust recogniser whose neural
// network models run on `rten`.
//
// Only compiled with the `ocr` feature. The `ocrs` and `rten` crates are
// 10-100x slower in debug builds; ship release builds.

use ::image::DynamicImage;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};

use super::models::OcrModelPaths;

/// Loaded detection and recognition models for a single language.
///
/// Model loading is the expensive step; keep the engine around and call
/// [`recognize_text`](Self::recognize_text) for each image.
pub struct OcrEngine {
    engine: OcrsEngine,
    language: String,
}

impl OcrEngine {
    /// Load the models described by `paths`.
    ///
    /// Fails with [`WandelwerkError::OcrError`] when a model file is missing
    /// or corrupt.
    #[instrument(skip_all, fields(
        language = %paths.language,
        recognition = %paths.recognition.display(),
    ))]
    pub fn load(paths: &OcrModelPaths) -> Result<Self> {
        paths.validate()?;

        let detection_model = Model::load_file(&paths.detection).map_err(|err| {
            WandelwerkError::OcrError(format!(
                "failed to load detection model from {}: {err}",
                paths.detection.display()
            ))
        })?;
        let recognition_model = Model::load_file(&paths.recognition).map_err(|err| {
            WandelwerkError::OcrError(format!(
                "failed to load recognition model from {}: {err}",
                paths.recognition.display()
            ))
        })?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| WandelwerkError::OcrError(format!("failed to initialise OCR engine: {err}")))?;

        info!("OCR engine ready");
        Ok(Self {
            engine,
            language: paths.language.clone(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Extract all text from an image, lines separated by `\n`.
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), language = %self.language))]
    pub fn recognize_text(&self, image: &DynamicImage) -> Result<String> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            WandelwerkError::OcrError(format!(
                "failed to create image source ({width}x{height}): {err}"
            ))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| WandelwerkError::OcrError(format!("OCR preprocessing failed: {err}")))?;
        let text = self
            .engine
            .get_text(&input)
            .map_err(|err| WandelwerkError::OcrError(format!("OCR text recognition failed: {err}")))?;

        debug!(
            line_count = text.lines().count(),
            char_count = text.len(),
            "OCR recognition complete"
        );
        Ok(text)
    }
}

impl std::fmt::Debug for OcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrEngine")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}
