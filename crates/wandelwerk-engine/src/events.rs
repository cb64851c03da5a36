// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outbound notifications: job state transitions and activity audit events.
//
// Both traits are fire-and-forget from the engine's point of view. A failing
// consumer is logged and never changes the outcome of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use wandelwerk_core::error::Result;
use wandelwerk_core::types::{ConversionJob, JobId, JobOutput, JobStatus};

/// A single edge taken in a job's state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    /// Failure message, present only on transitions into `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Result, present only on transitions into `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
}

/// Receives every transition the tracker performs (e.g. a persistence layer).
pub trait TransitionListener: Send + Sync {
    /// A job entered the tracker in `pending`.
    fn on_registered(&self, _job: &ConversionJob) {}

    fn on_transition(&self, event: &TransitionEvent);
}

/// What an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    /// A single job completed.
    Transform,
    /// A batch finished (whatever its per-item outcomes).
    Batch,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Batch => "batch",
        }
    }
}

/// Activity record handed to an [`AuditSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user_id: Option<String>,
    pub action: AuditAction,
    pub job_id: Option<JobId>,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, metadata: serde_json::Value) -> Self {
        Self {
            user_id: None,
            action,
            job_id: None,
            metadata,
            at: Utc::now(),
        }
    }

    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn by_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Writes audit events to the `tracing` pipeline under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        info!(
            target: "audit",
            action = event.action.as_str(),
            user = event.user_id.as_deref().unwrap_or("-"),
            job_id = ?event.job_id,
            metadata = %event.metadata,
            "Audit event"
        );
        Ok(())
    }
}
