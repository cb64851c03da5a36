// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF edit adapter — text stamps, annotations and structural compression.

use async_trait::async_trait;
use tracing::instrument;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::{Color, TransformOptions};
use wandelwerk_core::types::{FileFormat, JobOutput, OperationKind};
use wandelwerk_document::{PdfReader, TextStamp};

use super::{TransformBackend, TransformRequest, blocking};
use crate::inspect::check_pages;
use crate::registry::BackendId;

pub const DEFAULT_TEXT_X: f32 = 50.0;
pub const DEFAULT_TEXT_Y: f32 = 50.0;
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfEditBackend;

/// The stamp described by add-text options, with defaults filled in.
pub fn text_stamp(options: &TransformOptions) -> Result<TextStamp> {
    let text = options
        .text
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| WandelwerkError::InvalidOptions("add-text needs non-empty text".into()))?;
    Ok(TextStamp {
        page: options.page.unwrap_or(0),
        x: options.x.unwrap_or(DEFAULT_TEXT_X),
        y: options.y.unwrap_or(DEFAULT_TEXT_Y),
        font_size: options.font_size.unwrap_or(DEFAULT_FONT_SIZE),
        color: options.color.unwrap_or(Color::BLACK),
        text,
    })
}

#[async_trait]
impl TransformBackend for PdfEditBackend {
    fn id(&self) -> BackendId {
        BackendId::PdfEdit
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, operation = %request.operation))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        let operation = request.operation;
        if !matches!(
            operation,
            OperationKind::AddText | OperationKind::Annotate | OperationKind::Compress
        ) {
            return Err(request.not_handled());
        }

        let input = request.read_primary().await?;
        let options = request.options.clone();
        let bytes = blocking(move || {
            let reader = PdfReader::from_bytes(&input)?;
            check_pages(&options, operation, reader.page_count())?;
            match operation {
                OperationKind::AddText => reader.add_text(&text_stamp(&options)?),
                OperationKind::Annotate => reader.annotate(&options.annotations),
                _ => reader.compress(),
            }
        })
        .await?;

        request.store_output(bytes, FileFormat::Pdf).await
    }
}
