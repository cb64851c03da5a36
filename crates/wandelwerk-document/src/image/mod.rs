// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — raster processing, collage composition, and SVG rasterisation.

pub mod collage;
pub mod processor;
pub mod vector;

pub use processor::ImageProcessor;
