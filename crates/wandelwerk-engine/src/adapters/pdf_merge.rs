// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF assembly adapter — merge N PDFs, or build one PDF from N images.

use async_trait::async_trait;
use tracing::{info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{FileFormat, JobOutput, OperationKind};
use wandelwerk_document::{PdfReader, PdfWriter};

use super::{TransformBackend, TransformRequest, blocking};
use crate::registry::BackendId;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfMergeBackend;

#[async_trait]
impl TransformBackend for PdfMergeBackend {
    fn id(&self) -> BackendId {
        BackendId::PdfMerge
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, operation = %request.operation, inputs = request.inputs.len()))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        let operation = request.operation;
        let needed = operation.min_inputs();
        if request.inputs.len() < needed {
            return Err(WandelwerkError::Validation(format!(
                "{operation} got {} input(s), at least {needed} required",
                request.inputs.len()
            )));
        }

        let inputs = request.read_all().await?;
        let bytes = match operation {
            OperationKind::Merge => {
                blocking(move || {
                    let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
                    PdfReader::merge(&refs)
                })
                .await?
            }
            OperationKind::ImagesToPdf => {
                blocking(move || {
                    let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
                    PdfWriter::default().images_to_pdf(&refs)
                })
                .await?
            }
            _ => return Err(request.not_handled()),
        };

        info!(bytes = bytes.len(), "PDF assembled");
        request.store_output(bytes, FileFormat::Pdf).await
    }
}
