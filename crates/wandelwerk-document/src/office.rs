// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Office engine wrapper — drives a headless LibreOffice (`soffice`) process to
// convert between office formats and PDF.
//
// The engine is treated as a black box: any spawn failure, timeout, non-zero
// exit or missing output file becomes `WandelwerkError::OfficeEngine`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::FileFormat;

/// Base name of the staged input file inside the scratch directory.
const STAGED_STEM: &str = "input";

/// Handle to an office rendering engine executable.
#[derive(Debug, Clone)]
pub struct OfficeEngine {
    binary: PathBuf,
    timeout: Duration,
}

impl OfficeEngine {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Convert `input` (in `source` format) to `target`, returning the bytes
    /// the engine wrote.
    ///
    /// The input is staged in a private scratch directory which is removed
    /// when the call returns, whatever the outcome.
    #[instrument(skip(self, input), fields(binary = %self.binary.display(), %source, %target))]
    pub async fn convert(&self, input: &[u8], source: FileFormat, target: FileFormat) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let staged = scratch
            .path()
            .join(format!("{STAGED_STEM}.{}", source.extension()));
        tokio::fs::write(&staged, input).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg("--headless")
            .arg("--norestore")
            .arg("--nolockcheck");
        if source == FileFormat::Pdf {
            // Without an explicit import filter soffice opens PDFs in Draw,
            // which cannot export to word-processor formats.
            command.arg("--infilter=writer_pdf_import");
        }
        command
            .arg("--convert-to")
            .arg(convert_filter(target))
            .arg("--outdir")
            .arg(scratch.path())
            .arg(&staged)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(?command, "Spawning office engine");
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Office engine timed out");
                return Err(WandelwerkError::OfficeEngine(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WandelwerkError::OfficeEngine(format!(
                    "{} not found",
                    self.binary.display()
                )));
            }
            Ok(Err(err)) => {
                return Err(WandelwerkError::OfficeEngine(format!(
                    "failed to start {}: {err}",
                    self.binary.display()
                )));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WandelwerkError::OfficeEngine(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let produced = scratch
            .path()
            .join(format!("{STAGED_STEM}.{}", target.extension()));
        let bytes = tokio::fs::read(&produced).await.map_err(|err| {
            // soffice exits 0 even when a filter rejects the document.
            WandelwerkError::OfficeEngine(format!("no {target} output produced: {err}"))
        })?;

        info!(output_bytes = bytes.len(), "Office conversion complete");
        Ok(bytes)
    }
}

/// The `--convert-to` argument for `target`: extension plus export filter.
pub fn convert_filter(target: FileFormat) -> String {
    match target {
        FileFormat::Docx => "docx:MS Word 2007 XML".into(),
        FileFormat::Doc => "doc:MS Word 97".into(),
        FileFormat::Txt => "txt:Text (encoded):UTF8".into(),
        FileFormat::Csv => "csv:Text - txt - csv (StarCalc):44,34,76".into(),
        other => other.extension().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_pick_explicit_exporters() {
        assert_eq!(convert_filter(FileFormat::Pdf), "pdf");
        assert_eq!(convert_filter(FileFormat::Jpeg), "jpg");
        assert_eq!(convert_filter(FileFormat::Docx), "docx:MS Word 2007 XML");
        assert!(convert_filter(FileFormat::Txt).ends_with("UTF8"));
    }

    #[tokio::test]
    async fn missing_binary_is_engine_unavailable() {
        let engine = OfficeEngine::new(
            "wandelwerk-test-no-such-office-binary",
            Duration::from_secs(5),
        );
        let err = engine
            .convert(b"hello", FileFormat::Docx, FileFormat::Pdf)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WandelwerkError::OfficeEngine(_)));
        assert!(err.to_string().contains("not found"));
    }
}
