// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WandelwerkError};

/// File name looked up inside the data directory when no path is given.
pub const CONFIG_FILE: &str = "wandelwerk.json";

/// Tunables for the dispatch engine and its reference backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of backend invocations running at once within a batch.
    pub max_concurrency: usize,
    /// Encoder quality used when a request does not specify one.
    pub default_quality: u8,
    /// Quality used by the compress operation when none is given.
    pub compress_quality: u8,
    /// Raster size for SVG input when no width/height is requested.
    pub svg_default_width: u32,
    pub svg_default_height: u32,
    /// Collage cell edge length in pixels.
    pub collage_cell_size: u32,
    /// Office rendering engine executable (LibreOffice).
    pub office_binary: String,
    /// Give up on a single office conversion after this many seconds.
    pub office_timeout_secs: u64,
    /// Directory holding OCR models. `None` uses the default cache directory.
    pub ocr_model_dir: Option<PathBuf>,
    /// Language codes the OCR models can recognise.
    pub ocr_languages: Vec<String>,
    /// Record an audit event for every completed operation.
    pub audit_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            default_quality: 90,
            compress_quality: 80,
            svg_default_width: 1920,
            svg_default_height: 1080,
            collage_cell_size: 500,
            office_binary: "soffice".into(),
            office_timeout_secs: 120,
            ocr_model_dir: None,
            ocr_languages: vec!["eng".into()],
            audit_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `wandelwerk.json` from `data_dir`, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn load_or_default(data_dir: impl AsRef<Path>) -> Self {
        Self::load(data_dir.as_ref().join(CONFIG_FILE)).unwrap_or_default()
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(WandelwerkError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        for (name, q) in [
            ("default_quality", self.default_quality),
            ("compress_quality", self.compress_quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(WandelwerkError::Config(format!(
                    "{name} must be 1-100, got {q}"
                )));
            }
        }
        if self.collage_cell_size == 0 || self.svg_default_width == 0 || self.svg_default_height == 0
        {
            return Err(WandelwerkError::Config(
                "collage and SVG dimensions must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Whether OCR models are configured for `language`.
    pub fn supports_ocr_language(&self, language: &str) -> bool {
        self.ocr_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_concurrency": 8, "ocr_languages": ["eng", "deu"]}"#)
                .unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.default_quality, 90);
        assert!(config.supports_ocr_language("DEU"));
        assert!(!config.supports_ocr_language("fra"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = EngineConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WandelwerkError::Config(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_or_default("/nonexistent/wandelwerk");
        assert_eq!(config, EngineConfig::default());
    }
}
