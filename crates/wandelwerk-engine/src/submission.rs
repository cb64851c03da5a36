// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Submission — the request shape callers hand to the engine.

use serde::{Deserialize, Serialize};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::TransformOptions;
use wandelwerk_core::types::{ArtifactHandle, ConversionJob, FileFormat, JobId, JobOutput, OperationKind};

use crate::batch::BatchResult;
use crate::inspect::check_cardinality;

/// One request: a set of inputs and the transformation to apply.
///
/// ```json
/// { "inputs": ["a.png", "b.png"], "source": "png", "target": "jpeg",
///   "operation": "compress", "options": { "quality": 70 } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub inputs: Vec<ArtifactHandle>,
    pub source: FileFormat,
    pub target: FileFormat,
    pub operation: OperationKind,
    #[serde(default)]
    pub options: TransformOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Submission {
    pub fn new(
        inputs: Vec<ArtifactHandle>,
        source: FileFormat,
        target: FileFormat,
        operation: OperationKind,
    ) -> Self {
        Self {
            inputs,
            source,
            target,
            operation,
            options: TransformOptions::default(),
            owner: None,
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WandelwerkError::Validation(format!("bad submission: {e}")))
    }

    /// Shape checks that decide how many jobs the submission becomes.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(WandelwerkError::Validation("submission has no inputs".into()));
        }
        if self.operation.is_combining() {
            check_cardinality(self.operation, self.inputs.len())?;
        }
        Ok(())
    }

    /// One job per input, or a single job holding every input when the
    /// operation combines them.
    pub fn into_jobs(self) -> Result<Vec<ConversionJob>> {
        self.validate()?;
        let Submission { inputs, source, target, operation, options, owner } = self;

        let build = |inputs: Vec<ArtifactHandle>| {
            let mut job = ConversionJob::new(source, target, operation, inputs)
                .with_options(options.clone());
            job.owner = owner.clone();
            job
        };

        if operation.is_combining() {
            Ok(vec![build(inputs)])
        } else {
            Ok(inputs.into_iter().map(|input| build(vec![input])).collect())
        }
    }
}

/// What `Engine::submit` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Single { job_id: JobId, output: JobOutput },
    Batch(BatchResult),
}

impl SubmissionOutcome {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }
}
