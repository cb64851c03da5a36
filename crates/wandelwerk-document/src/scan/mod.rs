// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition on scanned images.
//
// Model discovery is always available so callers can report which languages
// are installed; the recognition engine itself needs the `ocr` feature.

pub mod models;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use models::OcrModelPaths;
#[cfg(feature = "ocr")]
pub use ocr::OcrEngine;
