// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Office conversion adapter — delegates to an external office engine.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::Result;
use wandelwerk_core::types::{JobOutput, OperationKind};
use wandelwerk_document::OfficeEngine;

use super::{TransformBackend, TransformRequest};
use crate::registry::BackendId;

/// Document, spreadsheet and presentation conversions via LibreOffice.
#[derive(Debug, Clone)]
pub struct OfficeBackend {
    engine: OfficeEngine,
}

impl OfficeBackend {
    pub fn new(engine: OfficeEngine) -> Self {
        Self { engine }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(OfficeEngine::new(
            &config.office_binary,
            Duration::from_secs(config.office_timeout_secs),
        ))
    }
}

#[async_trait]
impl TransformBackend for OfficeBackend {
    fn id(&self) -> BackendId {
        BackendId::Office
    }

    #[instrument(skip_all, fields(job_id = %request.job_id, source = %request.source, target = %request.target))]
    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        if request.operation != OperationKind::Convert {
            return Err(request.not_handled());
        }
        let input = request.read_primary().await?;
        let output = self
            .engine
            .convert(&input, request.source, request.target)
            .await?;
        request.store_output(output, request.target).await
    }
}
