// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — assemble new PDF documents from raster images using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};

/// Images are placed at 72 DPI, so one pixel maps to one PDF point.
const PLACEMENT_DPI: f32 = 72.0;

/// Creates new PDF documents from raster images.
pub struct PdfWriter {
    /// Title metadata embedded in the PDF /Info dictionary.
    title: String,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new("Wandelwerk Document")
    }
}

impl PdfWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Build one PDF with a page per image, in input order.
    ///
    /// Every page is sized to its image so nothing is scaled or letterboxed.
    #[instrument(skip_all, fields(images = images.len()))]
    pub fn images_to_pdf(&self, images: &[&[u8]]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(WandelwerkError::PdfError(
                "at least one image is needed to build a PDF".into(),
            ));
        }

        let mut doc = PdfDocument::new(&self.title);
        let mut pages = Vec::with_capacity(images.len());

        for (index, bytes) in images.iter().enumerate() {
            let decoded = ::image::load_from_memory(bytes).map_err(|err| {
                WandelwerkError::ImageError(format!("image #{} could not be decoded: {err}", index + 1))
            })?;

            let (width, height) = (decoded.width() as usize, decoded.height() as usize);
            let raw = RawImage {
                pixels: RawImageData::U8(decoded.to_rgb8().into_raw()),
                width,
                height,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: Some(1.0),
                    scale_y: Some(1.0),
                    dpi: Some(PLACEMENT_DPI),
                    rotate: None,
                },
            }];

            let (page_w, page_h) = (pixels_to_mm(width), pixels_to_mm(height));
            debug!(index, width, height, "Image placed on its own page");
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        info!(
            pages = images.len(),
            output_bytes = output.len(),
            warnings = warnings.len(),
            "Image PDF assembled"
        );
        Ok(output)
    }
}

fn pixels_to_mm(pixels: usize) -> Mm {
    Mm(pixels as f32 * 25.4 / PLACEMENT_DPI)
}
