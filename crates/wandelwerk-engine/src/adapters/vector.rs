// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vector image adapter — SVG rasterisation, then raster encode or PDF assembly.

use async_trait::async_trait;
use tracing::instrument;
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::Result;
use wandelwerk_core::types::{FileFormat, JobOutput, OperationKind};
use wandelwerk_document::{ImageProcessor, PdfWriter, SvgRasterizer};

use super::{TransformBackend, TransformRequest, blocking};
use crate::registry::BackendId;

#[derive(Debug, Clone, Copy)]
pub struct VectorBackend {
    rasterizer: SvgRasterizer,
    default_quality: u8,
}

impl VectorBackend {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            rasterizer: SvgRasterizer::new(config.svg_default_width, config.svg_default_height),
            default_quality: config.default_quality,
        }
    }
}

#[async_trait]
impl TransformBackend for VectorBackend {
    fn id(&self) -> BackendId {
        BackendId::Vector
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, target = %request.target))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        if request.operation != OperationKind::Convert {
            return Err(request.not_handled());
        }
        let input = request.read_primary().await?;
        let rasterizer = self.rasterizer;
        let (width, height) = (request.options.width, request.options.height);
        let quality = request.options.quality.unwrap_or(self.default_quality);
        let target = request.target;

        let bytes = blocking(move || {
            let raster = ImageProcessor::from_dynamic(rasterizer.rasterize(&input, width, height)?);
            match target {
                FileFormat::Pdf => {
                    let png = raster.to_png_bytes()?;
                    PdfWriter::default().images_to_pdf(&[&png])
                }
                other => raster.encode(other, quality),
            }
        })
        .await?;

        request.store_output(bytes, target).await
    }
}
