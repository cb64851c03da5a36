// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image cleanup adapter — best-effort background and watermark removal.

use async_trait::async_trait;
use tracing::{debug, instrument};
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::Result;
use wandelwerk_core::types::{FileFormat, JobOutput, OperationKind};
use wandelwerk_document::ImageProcessor;
use wandelwerk_document::image::processor::WATERMARK_BLUR_SIGMA;

use super::{TransformBackend, TransformRequest, blocking};
use crate::registry::BackendId;

#[derive(Debug, Clone, Copy)]
pub struct ImageCleanupBackend {
    default_quality: u8,
}

impl ImageCleanupBackend {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_quality: config.default_quality,
        }
    }
}

#[async_trait]
impl TransformBackend for ImageCleanupBackend {
    fn id(&self) -> BackendId {
        BackendId::ImageCleanup
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, operation = %request.operation))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        let input = request.read_primary().await?;
        let quality = request.options.quality.unwrap_or(self.default_quality);

        match request.operation {
            OperationKind::RemoveBackground => {
                let png = blocking(move || {
                    ImageProcessor::from_bytes(&input)?
                        .remove_background()
                        .to_png_bytes()
                })
                .await?;
                request.store_output(png, FileFormat::Png).await
            }
            OperationKind::RemoveWatermark => {
                let target = request.target;
                let bytes = match request.options.region {
                    Some(region) => {
                        blocking(move || {
                            ImageProcessor::from_bytes(&input)?
                                .blur_region(region, WATERMARK_BLUR_SIGMA)?
                                .encode(target, quality)
                        })
                        .await?
                    }
                    None => {
                        debug!("No watermark region given, copying input through");
                        input
                    }
                };
                request.store_output(bytes, target).await
            }
            _ => Err(request.not_handled()),
        }
    }
}
