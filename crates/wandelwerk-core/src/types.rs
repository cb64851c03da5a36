// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Wandelwerk transformation engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WandelwerkError;
use crate::options::TransformOptions;

/// Unique identifier for a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = WandelwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| WandelwerkError::Validation(format!("invalid job id {s:?}: {e}")))
    }
}

/// Broad family a file format belongs to. Drives which backends can touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatFamily {
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Text,
    Raster,
    Vector,
}

/// Every file format the engine knows about.
///
/// Parsing is case-insensitive and accepts common aliases (`jpg`, `tif`).
/// Formats that parse are not necessarily convertible — that is the
/// capability registry's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Doc,
    Docx,
    Odt,
    Rtf,
    Txt,
    Html,
    Xls,
    Xlsx,
    Ods,
    Csv,
    Ppt,
    Pptx,
    Odp,
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
    Gif,
    #[serde(alias = "tif")]
    Tiff,
    Bmp,
    Svg,
}

impl FileFormat {
    /// All raster image formats, in a stable order.
    pub const RASTER: [FileFormat; 6] = [
        Self::Jpeg,
        Self::Png,
        Self::Webp,
        Self::Gif,
        Self::Tiff,
        Self::Bmp,
    ];

    /// Infer a format from a file extension or bare format name.
    ///
    /// A leading dot is ignored, so `".PDF"` and `"pdf"` are equivalent.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.');
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "odt" => Some(Self::Odt),
            "rtf" => Some(Self::Rtf),
            "txt" | "text" => Some(Self::Txt),
            "html" | "htm" => Some(Self::Html),
            "xls" => Some(Self::Xls),
            "xlsx" => Some(Self::Xlsx),
            "ods" => Some(Self::Ods),
            "csv" => Some(Self::Csv),
            "ppt" => Some(Self::Ppt),
            "pptx" => Some(Self::Pptx),
            "odp" => Some(Self::Odp),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    /// Infer a format from the extension of a file name or path.
    pub fn from_filename(name: &str) -> Option<Self> {
        name.rsplit_once('.')
            .and_then(|(_, ext)| Self::from_extension(ext))
    }

    /// Canonical file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Txt => "txt",
            Self::Html => "html",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Ods => "ods",
            Self::Csv => "csv",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
            Self::Odp => "odp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Svg => "svg",
        }
    }

    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Rtf => "application/rtf",
            Self::Txt => "text/plain",
            Self::Html => "text/html",
            Self::Xls => "application/vnd.ms-excel",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Ods => "application/vnd.oasis.opendocument.spreadsheet",
            Self::Csv => "text/csv",
            Self::Ppt => "application/vnd.ms-powerpoint",
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::Odp => "application/vnd.oasis.opendocument.presentation",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
            Self::Svg => "image/svg+xml",
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            Self::Pdf => FormatFamily::Pdf,
            Self::Doc | Self::Docx | Self::Odt | Self::Rtf => FormatFamily::Document,
            Self::Xls | Self::Xlsx | Self::Ods | Self::Csv => FormatFamily::Spreadsheet,
            Self::Ppt | Self::Pptx | Self::Odp => FormatFamily::Presentation,
            Self::Txt | Self::Html => FormatFamily::Text,
            Self::Jpeg | Self::Png | Self::Webp | Self::Gif | Self::Tiff | Self::Bmp => {
                FormatFamily::Raster
            }
            Self::Svg => FormatFamily::Vector,
        }
    }

    pub fn is_raster(&self) -> bool {
        self.family() == FormatFamily::Raster
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = WandelwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| WandelwerkError::UnknownFormat(s.to_string()))
    }
}

/// The kind of transformation a job requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Convert,
    Crop,
    Rotate,
    Resize,
    Compress,
    RemoveBackground,
    RemoveWatermark,
    Annotate,
    AddText,
    Ocr,
    Merge,
    ImagesToPdf,
    Collage,
}

impl OperationKind {
    pub const ALL: [OperationKind; 13] = [
        Self::Convert,
        Self::Crop,
        Self::Rotate,
        Self::Resize,
        Self::Compress,
        Self::RemoveBackground,
        Self::RemoveWatermark,
        Self::Annotate,
        Self::AddText,
        Self::Ocr,
        Self::Merge,
        Self::ImagesToPdf,
        Self::Collage,
    ];

    /// Wire name (kebab-case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Crop => "crop",
            Self::Rotate => "rotate",
            Self::Resize => "resize",
            Self::Compress => "compress",
            Self::RemoveBackground => "remove-background",
            Self::RemoveWatermark => "remove-watermark",
            Self::Annotate => "annotate",
            Self::AddText => "add-text",
            Self::Ocr => "ocr",
            Self::Merge => "merge",
            Self::ImagesToPdf => "images-to-pdf",
            Self::Collage => "collage",
        }
    }

    /// Whether the operation folds several inputs into a single output.
    pub fn is_combining(&self) -> bool {
        matches!(self, Self::Merge | Self::ImagesToPdf | Self::Collage)
    }

    /// Minimum number of input artifacts a single job of this kind needs.
    pub fn min_inputs(&self) -> usize {
        match self {
            Self::Merge | Self::Collage => 2,
            _ => 1,
        }
    }

    /// Maximum number of input artifacts, `None` when unbounded.
    pub fn max_inputs(&self) -> Option<usize> {
        if self.is_combining() { None } else { Some(1) }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = WandelwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| WandelwerkError::Validation(format!("unknown operation {s:?}")))
    }
}

/// Lifecycle states of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet handed to a backend.
    Pending,
    /// A backend is working on it.
    Processing,
    /// Finished successfully — terminal.
    Completed,
    /// Finished with an error — terminal.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal edge of the job state machine.
    ///
    /// `Pending -> Failed` covers jobs rejected before reaching a backend.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference into an artifact store. The engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(pub String);

impl ArtifactHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ArtifactHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A file produced by a backend and written to the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub handle: ArtifactHandle,
    pub filename: String,
    /// Size of the stored bytes.
    pub size: u64,
    pub format: FileFormat,
}

/// What a successful transformation yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobOutput {
    /// A stored file.
    Artifact(OutputArtifact),
    /// Extracted text (OCR) — nothing is written to the store.
    Text { text: String, language: String },
}

impl JobOutput {
    pub fn artifact(&self) -> Option<&OutputArtifact> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            Self::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Artifact(_) => None,
            Self::Text { text, .. } => Some(text),
        }
    }
}

/// A single transformation request and its lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    pub operation: OperationKind,
    /// Ordered inputs. Exactly one unless the operation is combining.
    pub inputs: Vec<ArtifactHandle>,
    pub options: TransformOptions,
    pub status: JobStatus,
    /// User on whose behalf the job runs (for audit events).
    pub owner: Option<String>,
    /// Set only once the job has completed.
    pub output: Option<JobOutput>,
    /// Set only once the job has failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionJob {
    pub fn new(
        source_format: FileFormat,
        target_format: FileFormat,
        operation: OperationKind,
        inputs: Vec<ArtifactHandle>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_format,
            target_format,
            operation,
            inputs,
            options: TransformOptions::default(),
            status: JobStatus::Pending,
            owner: None,
            output: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Single-input convenience constructor.
    pub fn single(
        source_format: FileFormat,
        target_format: FileFormat,
        operation: OperationKind,
        input: impl Into<ArtifactHandle>,
    ) -> Self {
        Self::new(source_format, target_format, operation, vec![input.into()])
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// A fresh pending job sharing this job's inputs and parameters.
    ///
    /// Terminal jobs are never resurrected; retrying always mints a new id.
    pub fn retry(&self) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            output: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// The first (and for per-item operations, only) input.
    pub fn primary_input(&self) -> Option<&ArtifactHandle> {
        self.inputs.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_case_insensitive() {
        assert_eq!(FileFormat::from_extension("DOCX"), Some(FileFormat::Docx));
        assert_eq!(FileFormat::from_extension(".Jpg"), Some(FileFormat::Jpeg));
        assert_eq!(FileFormat::from_extension("tif"), Some(FileFormat::Tiff));
        assert_eq!(FileFormat::from_extension("exe"), None);
    }

    #[test]
    fn format_from_filename_uses_last_extension() {
        assert_eq!(
            FileFormat::from_filename("report.final.PDF"),
            Some(FileFormat::Pdf)
        );
        assert_eq!(FileFormat::from_filename("README"), None);
    }

    #[test]
    fn operation_wire_names_round_trip() {
        for op in OperationKind::ALL {
            assert_eq!(op.as_str().parse::<OperationKind>().unwrap(), op);
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
        assert_eq!(
            "images_to_pdf".parse::<OperationKind>().unwrap(),
            OperationKind::ImagesToPdf
        );
    }

    #[test]
    fn operation_cardinality() {
        assert_eq!(OperationKind::Merge.min_inputs(), 2);
        assert_eq!(OperationKind::Collage.min_inputs(), 2);
        assert_eq!(OperationKind::ImagesToPdf.min_inputs(), 1);
        assert_eq!(OperationKind::Crop.max_inputs(), Some(1));
        assert_eq!(OperationKind::Merge.max_inputs(), None);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for next in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert!(!JobStatus::Completed.can_transition_to(next));
            assert!(!JobStatus::Failed.can_transition_to(next));
        }
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn retry_mints_new_pending_job() {
        let mut job = ConversionJob::single(
            FileFormat::Png,
            FileFormat::Jpeg,
            OperationKind::Convert,
            "in.png",
        );
        job.status = JobStatus::Failed;
        job.error_message = Some("boom".into());

        let again = job.retry();
        assert_ne!(again.id, job.id);
        assert_eq!(again.status, JobStatus::Pending);
        assert!(again.error_message.is_none());
        assert_eq!(again.inputs, job.inputs);
    }
}
