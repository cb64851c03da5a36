// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// wandelwerk-document — Transformation primitives for the Wandelwerk engine.
//
// Provides raster image operations (resize, crop, rotate, re-encode, cleanup,
// collage), SVG rasterisation, PDF operations (merge, text and annotation
// insertion, compression, text extraction, image-to-PDF assembly), an office
// engine process wrapper, and OCR behind the `ocr` feature.

pub mod image;
pub mod office;
pub mod pdf;
pub mod scan;

// Re-export the primary structs so callers can use `wandelwerk_document::PdfReader` etc.
pub use image::collage::compose_collage;
pub use image::processor::ImageProcessor;
pub use image::vector::SvgRasterizer;
pub use office::OfficeEngine;
pub use pdf::reader::{PdfReader, TextStamp};
pub use pdf::writer::PdfWriter;
pub use scan::models::OcrModelPaths;

#[cfg(feature = "ocr")]
pub use scan::ocr::OcrEngine;
