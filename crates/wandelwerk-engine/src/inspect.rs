// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pre-dispatch checks: options, input cardinality, and input geometry.
//
// Everything here runs before a backend is chosen. A failure leaves the job
// `pending -> failed` with a validation error and no adapter is invoked.

use tracing::debug;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::{Region, TransformOptions};
use wandelwerk_core::types::{ConversionJob, FileFormat, OperationKind};
use wandelwerk_document::{ImageProcessor, PdfReader};

use crate::store::ArtifactStore;

/// Reject an input count the operation cannot take.
pub fn check_cardinality(operation: OperationKind, count: usize) -> Result<()> {
    let min = operation.min_inputs();
    if count < min {
        return Err(WandelwerkError::Validation(format!(
            "{operation} got {count} input(s), at least {min} required"
        )));
    }
    if let Some(max) = operation.max_inputs()
        && count > max
    {
        return Err(WandelwerkError::Validation(format!(
            "{operation} got {count} inputs, at most {max} allowed"
        )));
    }
    Ok(())
}

/// Checks that need nothing but the job itself.
pub fn validate_static(job: &ConversionJob) -> Result<()> {
    job.options.validate(job.operation)?;
    check_cardinality(job.operation, job.inputs.len())
}

/// Every page the options reference must exist in a `page_count`-page document.
pub fn check_pages(
    options: &TransformOptions,
    operation: OperationKind,
    page_count: usize,
) -> Result<()> {
    for page in options.referenced_pages(operation) {
        if page as usize >= page_count {
            return Err(WandelwerkError::Validation(format!(
                "page {page} out of range (document has {page_count} pages)"
            )));
        }
    }
    Ok(())
}

/// The region must lie entirely inside a `width` x `height` image.
pub fn check_region(region: &Region, width: u32, height: u32) -> Result<()> {
    if !region.fits_within(width, height) {
        return Err(WandelwerkError::Validation(format!(
            "region {}x{} at ({}, {}) exceeds the {width}x{height} input",
            region.width, region.height, region.x, region.y
        )));
    }
    Ok(())
}

/// Check geometry-dependent options against the actual input.
///
/// Only crop, watermark, add-text and annotate look at their input here.
/// Inputs that cannot be parsed are left for the backend to reject, so
/// decode errors surface as backend failures.
pub async fn inspect_geometry(job: &ConversionJob, store: &dyn ArtifactStore) -> Result<()> {
    let Some(handle) = job.primary_input() else {
        return Ok(());
    };

    match job.operation {
        OperationKind::Crop | OperationKind::RemoveWatermark if job.source_format.is_raster() => {
            let Some(region) = job.options.region else {
                return Ok(());
            };
            let bytes = store.read(handle).await?;
            match ImageProcessor::probe_dimensions(&bytes) {
                Ok((width, height)) => check_region(&region, width, height),
                Err(err) => {
                    debug!(job_id = %job.id, error = %err, "Skipping geometry check, input unreadable");
                    Ok(())
                }
            }
        }
        OperationKind::AddText | OperationKind::Annotate
            if job.source_format == FileFormat::Pdf =>
        {
            let bytes = store.read(handle).await?;
            match PdfReader::from_bytes(&bytes) {
                Ok(reader) => check_pages(&job.options, job.operation, reader.page_count()),
                Err(err) => {
                    debug!(job_id = %job.id, error = %err, "Skipping page check, input unreadable");
                    Ok(())
                }
            }
        }
        _ => Ok(()),
    }
}
