// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// wandelwerk-engine — Capability registry, backend adapters, job tracker,
// dispatcher and batch executor.  Artifact bytes live behind `ArtifactStore`;
// job history and audit records are optional SQLite consumers of the
// tracker's and dispatcher's events.

pub mod adapters;
pub mod audit;
pub mod batch;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod inspect;
pub mod job_store;
pub mod registry;
pub mod store;
pub mod submission;
pub mod tracker;

pub use adapters::{AdapterSet, TransformBackend, TransformRequest};
pub use audit::AuditLog;
pub use batch::{BatchExecutor, BatchFailure, BatchResult, BatchSuccess, BatchSummary};
pub use dispatcher::Dispatcher;
pub use engine::{Engine, EngineBuilder};
pub use events::{AuditAction, AuditEvent, AuditSink, TracingAuditSink, TransitionEvent, TransitionListener};
pub use job_store::SqliteJobStore;
pub use registry::{BackendId, CapabilityRegistry, Resolution};
pub use store::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore};
pub use submission::{Submission, SubmissionOutcome};
pub use tracker::{JobLease, JobTracker, StatusCounts};
