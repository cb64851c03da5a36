// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format capability registry — the static routing table from
// (source format, target format, operation) to a backend family.
//
// Lookups are pure and total: anything not in the table is `Unsupported`,
// never an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{FileFormat, OperationKind};

/// Identifies a transformation backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendId {
    /// External office engine (LibreOffice).
    Office,
    /// Raster image pipeline.
    Raster,
    /// SVG rasterisation.
    Vector,
    /// PDF concatenation and image-to-PDF assembly.
    PdfMerge,
    /// In-place PDF edits: text, annotations, compression.
    PdfEdit,
    Ocr,
    /// Best-effort background and watermark removal.
    ImageCleanup,
}

impl BackendId {
    pub const ALL: [BackendId; 7] = [
        Self::Office,
        Self::Raster,
        Self::Vector,
        Self::PdfMerge,
        Self::PdfEdit,
        Self::Ocr,
        Self::ImageCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Office => "office",
            Self::Raster => "raster",
            Self::Vector => "vector",
            Self::PdfMerge => "pdf-merge",
            Self::PdfEdit => "pdf-edit",
            Self::Ocr => "ocr",
            Self::ImageCleanup => "image-cleanup",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Backend(BackendId),
    Unsupported,
}

impl Resolution {
    pub fn backend(self) -> Option<BackendId> {
        match self {
            Self::Backend(id) => Some(id),
            Self::Unsupported => None,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Lookup key of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityKey {
    pub source: FileFormat,
    pub target: FileFormat,
    pub operation: OperationKind,
}

/// Immutable routing table. Build once, share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    table: BTreeMap<CapabilityKey, BackendId>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CapabilityRegistry {
    // -- Construction ---------------------------------------------------------

    /// Build a registry from explicit entries. Duplicate keys are rejected.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (CapabilityKey, BackendId)>,
    ) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (key, backend) in entries {
            if let Some(existing) = table.insert(key, backend) {
                return Err(WandelwerkError::Config(format!(
                    "duplicate capability {} {} -> {} (already routed to {existing})",
                    key.operation, key.source, key.target
                )));
            }
        }
        Ok(Self { table })
    }

    /// The built-in routing table.
    pub fn standard() -> Self {
        use FileFormat::*;
        use OperationKind::*;

        let mut table = BTreeMap::new();
        let mut route = |operation, sources: &[FileFormat], targets: &[FileFormat], backend| {
            for &source in sources {
                for &target in targets {
                    table.insert(CapabilityKey { source, target, operation }, backend);
                }
            }
        };

        // Office engine.
        route(Convert, &[Doc, Docx, Odt, Rtf], &[Pdf], BackendId::Office);
        route(Convert, &[Docx, Odt], &[Txt, Html], BackendId::Office);
        route(Convert, &[Xls, Xlsx, Ods], &[Pdf], BackendId::Office);
        route(Convert, &[Xlsx, Ods], &[Csv], BackendId::Office);
        route(Convert, &[Ppt, Pptx, Odp], &[Pdf], BackendId::Office);
        route(Convert, &[Pdf], &[Doc, Docx, Png, Jpeg], BackendId::Office);

        // Raster and vector images.
        let raster = FileFormat::RASTER;
        let mut raster_targets = raster.to_vec();
        raster_targets.push(Pdf);
        route(Convert, &raster, &raster_targets, BackendId::Raster);
        route(Convert, &[Svg], &[Png, Jpeg, Webp, Pdf], BackendId::Vector);
        for format in raster {
            route(Crop, &[format], &[format], BackendId::Raster);
            route(Rotate, &[format], &[format], BackendId::Raster);
            route(Resize, &[format], &[format], BackendId::Raster);
            route(RemoveWatermark, &[format], &[format], BackendId::ImageCleanup);
        }
        route(Compress, &raster, &[Jpeg], BackendId::Raster);
        route(Collage, &raster, &[Jpeg], BackendId::Raster);
        route(RemoveBackground, &raster, &[Png], BackendId::ImageCleanup);

        // PDF.
        route(Compress, &[Pdf], &[Pdf], BackendId::PdfEdit);
        route(Annotate, &[Pdf], &[Pdf], BackendId::PdfEdit);
        route(AddText, &[Pdf], &[Pdf], BackendId::PdfEdit);
        route(Merge, &[Pdf], &[Pdf], BackendId::PdfMerge);
        route(ImagesToPdf, &raster, &[Pdf], BackendId::PdfMerge);

        // Text recognition.
        route(OperationKind::Ocr, &raster, &[Txt], BackendId::Ocr);
        route(OperationKind::Ocr, &[Pdf], &[Txt], BackendId::Ocr);

        Self { table }
    }

    // -- Lookups --------------------------------------------------------------

    pub fn resolve(
        &self,
        source: FileFormat,
        target: FileFormat,
        operation: OperationKind,
    ) -> Resolution {
        self.table
            .get(&CapabilityKey { source, target, operation })
            .map_or(Resolution::Unsupported, |&backend| Resolution::Backend(backend))
    }

    /// Resolve from wire strings. Formats match case-insensitively; anything
    /// that does not parse is simply unsupported.
    pub fn resolve_str(&self, source: &str, target: &str, operation: &str) -> Resolution {
        let parsed = (
            FileFormat::from_extension(source),
            FileFormat::from_extension(target),
            operation.parse::<OperationKind>().ok(),
        );
        match parsed {
            (Some(source), Some(target), Some(operation)) => {
                self.resolve(source, target, operation)
            }
            _ => Resolution::Unsupported,
        }
    }

    /// Formats `source` can be converted to. Empty for unknown sources.
    pub fn supported_targets(&self, source: FileFormat) -> BTreeSet<FileFormat> {
        self.table
            .keys()
            .filter(|key| key.source == source && key.operation == OperationKind::Convert)
            .map(|key| key.target)
            .collect()
    }

    /// String form of [`supported_targets`](Self::supported_targets).
    pub fn supported_targets_str(&self, source: &str) -> BTreeSet<FileFormat> {
        FileFormat::from_extension(source)
            .map(|format| self.supported_targets(format))
            .unwrap_or_default()
    }

    /// Every operation that accepts `source` as input.
    pub fn operations_for(&self, source: FileFormat) -> BTreeSet<OperationKind> {
        self.table
            .keys()
            .filter(|key| key.source == source)
            .map(|key| key.operation)
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&CapabilityKey, &BackendId)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
