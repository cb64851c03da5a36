// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR adapter — text from rasters (ocrs, feature `ocr`) or from a PDF's
// embedded text layer. Produces `JobOutput::Text`, never an artifact.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument};
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{FileFormat, JobOutput, OperationKind};
use wandelwerk_document::PdfReader;
use wandelwerk_document::scan::models::{DEFAULT_LANGUAGE, default_model_dir};

use super::{TransformBackend, TransformRequest, blocking};
use crate::registry::BackendId;

#[cfg(feature = "ocr")]
use std::collections::HashMap;
#[cfg(feature = "ocr")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "ocr")]
use wandelwerk_document::{ImageProcessor, OcrEngine, OcrModelPaths};

#[derive(Debug)]
pub struct OcrBackend {
    model_dir: PathBuf,
    languages: Vec<String>,
    /// Loaded engines by language; model loading is the expensive part.
    #[cfg(feature = "ocr")]
    engines: Mutex<HashMap<String, Arc<OcrEngine>>>,
}

impl OcrBackend {
    pub fn new(model_dir: impl Into<PathBuf>, languages: Vec<String>) -> Self {
        Self {
            model_dir: model_dir.into(),
            languages: languages.into_iter().map(|l| l.to_ascii_lowercase()).collect(),
            #[cfg(feature = "ocr")]
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.ocr_model_dir.clone().unwrap_or_else(default_model_dir),
            config.ocr_languages.clone(),
        )
    }

    fn check_language(&self, language: &str) -> Result<()> {
        if self.languages.iter().any(|l| l == language) {
            Ok(())
        } else {
            Err(WandelwerkError::OcrError(format!(
                "no model available for language '{language}'"
            )))
        }
    }

    #[cfg(feature = "ocr")]
    async fn recognize_raster(&self, input: Vec<u8>, language: &str) -> Result<String> {
        let engine = self.engine_for(language).await?;
        blocking(move || {
            let image = ImageProcessor::from_bytes(&input)?.into_dynamic();
            engine.recognize_text(&image)
        })
        .await
    }

    #[cfg(not(feature = "ocr"))]
    async fn recognize_raster(&self, _input: Vec<u8>, language: &str) -> Result<String> {
        Err(WandelwerkError::OcrError(format!(
            "raster OCR ({language}) is not available: built without the `ocr` feature"
        )))
    }

    #[cfg(feature = "ocr")]
    async fn engine_for(&self, language: &str) -> Result<Arc<OcrEngine>> {
        let cached = self
            .engines
            .lock()
            .map_err(|_| WandelwerkError::OcrError("engine cache lock poisoned".into()))?
            .get(language)
            .cloned();
        if let Some(engine) = cached {
            return Ok(engine);
        }

        let paths = OcrModelPaths::for_language(&self.model_dir, language);
        let engine = Arc::new(blocking(move || OcrEngine::load(&paths)).await?);
        self.engines
            .lock()
            .map_err(|_| WandelwerkError::OcrError("engine cache lock poisoned".into()))?
            .insert(language.to_string(), engine.clone());
        Ok(engine)
    }
}

#[async_trait]
impl TransformBackend for OcrBackend {
    fn id(&self) -> BackendId {
        BackendId::Ocr
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, source = %request.source))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        if request.operation != OperationKind::Ocr {
            return Err(request.not_handled());
        }
        let language = request
            .options
            .language
            .as_deref()
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_ascii_lowercase();
        self.check_language(&language)?;

        let input = request.read_primary().await?;
        let text = if request.source == FileFormat::Pdf {
            let text = blocking(move || PdfReader::from_bytes(&input)?.extract_text()).await?;
            if text.trim().is_empty() {
                return Err(WandelwerkError::OcrError(
                    "PDF has no text layer; convert its pages to images and run OCR on those"
                        .into(),
                ));
            }
            text
        } else {
            self.recognize_raster(input, &language).await?
        };

        info!(model_dir = %self.model_dir.display(), %language, chars = text.len(), "Text recognised");
        Ok(JobOutput::Text { text, language })
    }
}
