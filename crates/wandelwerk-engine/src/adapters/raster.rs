// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster image adapter — convert, crop, rotate, resize, compress, collage.

use async_trait::async_trait;
use tracing::instrument;
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{FileFormat, JobOutput, OperationKind};
use wandelwerk_document::{ImageProcessor, PdfWriter, compose_collage};

use super::{TransformBackend, TransformRequest, blocking};
use crate::registry::BackendId;

#[derive(Debug, Clone, Copy)]
pub struct RasterBackend {
    default_quality: u8,
    compress_quality: u8,
    collage_cell_size: u32,
}

impl RasterBackend {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_quality: config.default_quality,
            compress_quality: config.compress_quality,
            collage_cell_size: config.collage_cell_size,
        }
    }
}

#[async_trait]
impl TransformBackend for RasterBackend {
    fn id(&self) -> BackendId {
        BackendId::Raster
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, operation = %request.operation))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        let opts = request.options.clone();
        let target = request.target;
        let quality = opts.quality.unwrap_or(self.default_quality);

        let bytes = match request.operation {
            OperationKind::Collage => {
                let inputs = request.read_all().await?;
                let cell = opts.cell_size.unwrap_or(self.collage_cell_size);
                blocking(move || {
                    let images = inputs
                        .iter()
                        .enumerate()
                        .map(|(i, data)| {
                            ImageProcessor::from_bytes(data)
                                .map(ImageProcessor::into_dynamic)
                                .map_err(|err| {
                                    WandelwerkError::ImageError(format!("collage input #{}: {err}", i + 1))
                                })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let sheet = compose_collage(&images, cell)?;
                    ImageProcessor::from_dynamic(sheet).encode(FileFormat::Jpeg, quality)
                })
                .await?
            }
            OperationKind::Convert if target == FileFormat::Pdf => {
                let input = request.read_primary().await?;
                blocking(move || {
                    let page = if opts.width.is_some() || opts.height.is_some() {
                        ImageProcessor::from_bytes(&input)?
                            .resize(opts.width, opts.height, opts.fit.unwrap_or_default())
                            .encode(FileFormat::Png, quality)?
                    } else {
                        input
                    };
                    PdfWriter::default().images_to_pdf(&[&page])
                })
                .await?
            }
            OperationKind::Convert
            | OperationKind::Crop
            | OperationKind::Rotate
            | OperationKind::Resize
            | OperationKind::Compress => {
                let input = request.read_primary().await?;
                let operation = request.operation;
                let compress_quality = opts.quality.unwrap_or(self.compress_quality);
                blocking(move || {
                    let image = ImageProcessor::from_bytes(&input)?;
                    match operation {
                        OperationKind::Crop => {
                            let region = opts.region.ok_or_else(|| {
                                WandelwerkError::InvalidOptions("crop needs a region".into())
                            })?;
                            image.crop(region)?.encode(target, quality)
                        }
                        OperationKind::Rotate => image
                            .rotate(opts.degrees.unwrap_or(0.0))
                            .encode(target, quality),
                        OperationKind::Resize => image
                            .resize(opts.width, opts.height, opts.fit.unwrap_or_default())
                            .encode(target, quality),
                        OperationKind::Compress => image.encode(FileFormat::Jpeg, compress_quality),
                        _ if opts.width.is_some() || opts.height.is_some() => image
                            .resize(opts.width, opts.height, opts.fit.unwrap_or_default())
                            .encode(target, quality),
                        _ => image.encode(target, quality),
                    }
                })
                .await?
            }
            _ => return Err(request.not_handled()),
        };

        let format = if request.operation == OperationKind::Compress {
            FileFormat::Jpeg
        } else {
            target
        };
        request.store_output(bytes, format).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::testing;
    use crate::store::MemoryArtifactStore;
    use wandelwerk_core::error::ErrorKind;
    use wandelwerk_core::options::{FitMode, Region, TransformOptions};

    fn backend() -> RasterBackend {
        RasterBackend::from_config(&EngineConfig::default())
    }

    async fn run(
        inputs: Vec<Vec<u8>>,
        operation: OperationKind,
        source: FileFormat,
        target: FileFormat,
        options: TransformOptions,
    ) -> (Arc<MemoryArtifactStore>, Result<JobOutput>) {
        let store = Arc::new(MemoryArtifactStore::new());
        let handles = inputs
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| store.insert(format!("in{i}.png"), bytes))
            .collect();
        let request = testing::request(store.clone(), handles, operation, source, target, options);
        let result = backend().transform(&request).await;
        (store, result)
    }

    #[tokio::test]
    async fn png_to_jpeg_conversion() {
        let (store, out) = run(
            vec![testing::png(20, 10)],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Jpeg,
            TransformOptions::default(),
        )
        .await;
        let out = out.unwrap();
        let artifact = out.artifact().unwrap();
        assert_eq!(artifact.format, FileFormat::Jpeg);
        assert_eq!(artifact.filename, "in0.jpg");
        let bytes = testing::output_bytes(&store, &out).await;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(artifact.size, bytes.len() as u64);
    }

    #[tokio::test]
    async fn crop_inside_bounds() {
        let options = TransformOptions {
            region: Some(Region { x: 2, y: 2, width: 5, height: 4 }),
            ..Default::default()
        };
        let (store, out) = run(
            vec![testing::png(20, 10)],
            OperationKind::Crop,
            FileFormat::Png,
            FileFormat::Png,
            options,
        )
        .await;
        let bytes = testing::output_bytes(&store, &out.unwrap()).await;
        assert_eq!(ImageProcessor::probe_dimensions(&bytes).unwrap(), (5, 4));
    }

    #[tokio::test]
    async fn crop_out_of_bounds_is_validation() {
        let options = TransformOptions {
            region: Some(Region { x: 0, y: 0, width: 5000, height: 5000 }),
            ..Default::default()
        };
        let (_, out) = run(
            vec![testing::png(100, 100)],
            OperationKind::Crop,
            FileFormat::Png,
            FileFormat::Png,
            options,
        )
        .await;
        assert_eq!(out.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn resize_inside_keeps_aspect() {
        let options = TransformOptions {
            width: Some(10),
            height: Some(10),
            fit: Some(FitMode::Inside),
            ..Default::default()
        };
        let (store, out) = run(
            vec![testing::png(40, 20)],
            OperationKind::Resize,
            FileFormat::Png,
            FileFormat::Png,
            options,
        )
        .await;
        let bytes = testing::output_bytes(&store, &out.unwrap()).await;
        assert_eq!(ImageProcessor::probe_dimensions(&bytes).unwrap(), (10, 5));
    }

    #[tokio::test]
    async fn convert_applies_requested_width() {
        let options = TransformOptions { width: Some(10), ..Default::default() };
        let (store, out) = run(
            vec![testing::png(40, 20)],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Jpeg,
            options,
        )
        .await;
        let bytes = testing::output_bytes(&store, &out.unwrap()).await;
        assert_eq!(ImageProcessor::probe_dimensions(&bytes).unwrap(), (10, 5));
    }

    #[tokio::test]
    async fn convert_never_enlarges_by_default() {
        let options = TransformOptions { width: Some(80), ..Default::default() };
        let (store, out) = run(
            vec![testing::png(40, 20)],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Png,
            options,
        )
        .await;
        let bytes = testing::output_bytes(&store, &out.unwrap()).await;
        assert_eq!(ImageProcessor::probe_dimensions(&bytes).unwrap(), (40, 20));
    }

    #[tokio::test]
    async fn compress_always_yields_jpeg() {
        let (_, out) = run(
            vec![testing::png(16, 16)],
            OperationKind::Compress,
            FileFormat::Png,
            FileFormat::Jpeg,
            TransformOptions::default(),
        )
        .await;
        assert_eq!(out.unwrap().artifact().unwrap().format, FileFormat::Jpeg);
    }

    #[tokio::test]
    async fn collage_grid_size() {
        let options = TransformOptions { cell_size: Some(50), ..Default::default() };
        let inputs = (0..3).map(|_| testing::png(30, 20)).collect();
        let (store, out) = run(
            inputs,
            OperationKind::Collage,
            FileFormat::Png,
            FileFormat::Jpeg,
            options,
        )
        .await;
        let out = out.unwrap();
        assert_eq!(out.artifact().unwrap().filename, "collage.jpg");
        let bytes = testing::output_bytes(&store, &out).await;
        // 3 images -> 2 columns x 2 rows of 50px cells.
        assert_eq!(ImageProcessor::probe_dimensions(&bytes).unwrap(), (100, 100));
    }

    #[tokio::test]
    async fn collage_too_large_is_validation() {
        let options = TransformOptions { cell_size: Some(4096), ..Default::default() };
        let inputs = (0..100).map(|_| testing::png(2, 2)).collect();
        let (store, out) = run(
            inputs,
            OperationKind::Collage,
            FileFormat::Png,
            FileFormat::Jpeg,
            options,
        )
        .await;
        assert_eq!(out.unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(store.len(), 100);
    }

    #[tokio::test]
    async fn corrupt_input_is_backend_failure() {
        let (_, out) = run(
            vec![b"definitely not an image".to_vec()],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Jpeg,
            TransformOptions::default(),
        )
        .await;
        assert_eq!(out.unwrap_err().kind(), ErrorKind::BackendFailure);
    }

    #[tokio::test]
    async fn raster_to_pdf() {
        let (store, out) = run(
            vec![testing::png(8, 8)],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Pdf,
            TransformOptions::default(),
        )
        .await;
        let bytes = testing::output_bytes(&store, &out.unwrap()).await;
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn raster_to_pdf_with_width_resizes_page_image() {
        let options = TransformOptions { width: Some(4), ..Default::default() };
        let (store, out) = run(
            vec![testing::png(8, 8)],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Pdf,
            options,
        )
        .await;
        let bytes = testing::output_bytes(&store, &out.unwrap()).await;
        assert!(bytes.starts_with(b"%PDF"));
    }
}
