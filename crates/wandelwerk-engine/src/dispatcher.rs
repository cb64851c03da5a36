// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatcher — runs one job end to end.
//
//   claim ─► validate ─► resolve ─► inspect ─► processing ─► adapter ─► completed
//              │            │          │                        │
//              └────────────┴──────────┴──► failed ◄────────────┘
//
// Whatever happens, the job's terminal state matches the returned result and
// no path leaves it in `processing`.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument, warn};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{ConversionJob, JobOutput};

use crate::adapters::{AdapterSet, TransformRequest};
use crate::events::{AuditAction, AuditEvent, AuditSink};
use crate::inspect;
use crate::registry::{BackendId, CapabilityRegistry, Resolution};
use crate::store::ArtifactStore;
use crate::tracker::{JobLease, JobTracker};

pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    adapters: AdapterSet,
    tracker: Arc<JobTracker>,
    store: Arc<dyn ArtifactStore>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        adapters: AdapterSet,
        tracker: Arc<JobTracker>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            registry,
            adapters,
            tracker,
            store,
            audit: None,
        }
    }

    /// Send an audit event for every completed job (and batch) to `sink`.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Run `job` through validation, resolution and its backend.
    ///
    /// Registers the job with the tracker if it is not known yet.
    #[instrument(skip_all, fields(
        job_id = %job.id,
        operation = %job.operation,
        source = %job.source_format,
        target = %job.target_format,
    ))]
    pub async fn execute(&self, job: ConversionJob) -> Result<JobOutput> {
        let id = job.id;
        if !self.tracker.contains(id) {
            self.tracker.register(job)?;
        }
        let lease = self.tracker.claim(id)?;
        let job = self
            .tracker
            .snapshot(id)
            .ok_or(WandelwerkError::UnknownJob(id))?;

        if let Err(err) = inspect::validate_static(&job) {
            return self.reject(lease, err);
        }

        let backend = match self
            .registry
            .resolve(job.source_format, job.target_format, job.operation)
        {
            Resolution::Backend(backend) => backend,
            Resolution::Unsupported => {
                let err = WandelwerkError::UnsupportedOperation {
                    from: job.source_format,
                    to: job.target_format,
                    operation: job.operation,
                };
                return self.reject(lease, err);
            }
        };
        // Input geometry is only read for triples some backend accepts.
        if let Err(err) = inspect::inspect_geometry(&job, self.store.as_ref()).await {
            return self.reject(lease, err);
        }
        let Some(adapter) = self.adapters.get(backend) else {
            let err = WandelwerkError::BackendUnavailable(format!("backend {backend} not configured"));
            return self.reject(lease, err);
        };

        self.tracker.start(&lease)?;
        let request = TransformRequest::from_job(&job, self.store.clone());
        match adapter.transform(&request).await {
            Ok(output) => {
                let done = self.tracker.complete(lease, output.clone())?;
                info!(%backend, "Job completed");
                self.audit_completion(&done, backend, &output);
                Ok(output)
            }
            Err(err) => {
                warn!(%backend, kind = ?err.kind(), error = %err, "Backend failed");
                self.tracker.fail(lease, err.to_string())?;
                Err(err)
            }
        }
    }

    /// Fail a job that never reached a backend.
    fn reject(&self, lease: JobLease, err: WandelwerkError) -> Result<JobOutput> {
        warn!(kind = ?err.kind(), error = %err, "Job rejected before dispatch");
        self.tracker.fail(lease, err.to_string())?;
        Err(err)
    }

    fn audit_completion(&self, job: &ConversionJob, backend: BackendId, output: &JobOutput) {
        let detail = match output {
            JobOutput::Artifact(artifact) => json!({
                "filename": artifact.filename,
                "size": artifact.size,
            }),
            JobOutput::Text { text, language } => json!({
                "language": language,
                "chars": text.chars().count(),
            }),
        };
        let event = AuditEvent::new(
            AuditAction::Transform,
            json!({
                "operation": job.operation,
                "source": job.source_format,
                "target": job.target_format,
                "backend": backend,
                "inputs": job.inputs.len(),
                "output": detail,
            }),
        )
        .for_job(job.id)
        .by_user(job.owner.clone());
        self.emit_audit(&event);
    }

    /// Hand `event` to the audit sink, if any. Sink failures are only logged.
    pub(crate) fn emit_audit(&self, event: &AuditEvent) {
        if let Some(sink) = &self.audit
            && let Err(err) = sink.record(event)
        {
            error!(action = event.action.as_str(), error = %err, "Audit sink rejected event");
        }
    }
}
