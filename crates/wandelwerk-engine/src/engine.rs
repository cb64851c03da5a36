// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine — the assembled dispatch pipeline behind one handle.
//
// Built once at startup; everything inside is shared read-only or guarded by
// the tracker, so an `Engine` can sit in an `Arc` and serve concurrent calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{ConversionJob, FileFormat, JobOutput};

use crate::adapters::{AdapterSet, TransformBackend};
use crate::batch::{BatchExecutor, BatchResult};
use crate::dispatcher::Dispatcher;
use crate::events::{AuditSink, TracingAuditSink, TransitionListener};
use crate::registry::CapabilityRegistry;
use crate::store::ArtifactStore;
use crate::submission::{Submission, SubmissionOutcome};
use crate::tracker::JobTracker;

pub struct Engine {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    batch: BatchExecutor,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        self.dispatcher.registry()
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        self.dispatcher.tracker()
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        self.dispatcher.store()
    }

    /// Target formats `source` can be converted to (the `convert` rows of the
    /// registry). Unknown format names yield an empty set.
    pub fn list_supported_targets(&self, source: &str) -> BTreeSet<FileFormat> {
        self.registry().supported_targets_str(source)
    }

    /// Forget completed and failed jobs last updated before `before`.
    /// Their ids stay reserved; see [`JobTracker::purge_terminal`].
    pub fn purge_finished(&self, before: DateTime<Utc>) -> Result<usize> {
        self.tracker().purge_terminal(before)
    }

    pub async fn execute(&self, job: ConversionJob) -> Result<JobOutput> {
        self.dispatcher.execute(job).await
    }

    pub async fn execute_batch(&self, jobs: Vec<ConversionJob>) -> Result<BatchResult> {
        self.batch.execute_batch(jobs).await
    }

    /// Turn `submission` into jobs and run them.
    ///
    /// A single resulting job is executed directly and its error returned as
    /// is; several go through the batch executor.
    #[instrument(skip_all, fields(operation = %submission.operation, inputs = submission.inputs.len()))]
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionOutcome> {
        let mut jobs = submission.into_jobs()?;
        if jobs.len() == 1
            && let Some(job) = jobs.pop()
        {
            let job_id = job.id;
            let output = self.dispatcher.execute(job).await?;
            return Ok(SubmissionOutcome::Single { job_id, output });
        }
        Ok(SubmissionOutcome::Batch(self.batch.execute_batch(jobs).await?))
    }
}

/// Assembles an [`Engine`]. Only the artifact store is mandatory; the rest
/// defaults to the standard registry and adapters built from the config.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn ArtifactStore>>,
    registry: Option<CapabilityRegistry>,
    adapters: Option<AdapterSet>,
    overrides: Vec<Arc<dyn TransformBackend>>,
    listeners: Vec<Arc<dyn TransitionListener>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: None,
            registry: None,
            adapters: None,
            overrides: Vec::new(),
            listeners: Vec::new(),
            audit: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the whole adapter set.
    pub fn adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Install one adapter on top of whichever set is used.
    pub fn adapter(mut self, adapter: Arc<dyn TransformBackend>) -> Self {
        self.overrides.push(adapter);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TransitionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Audit destination. Ignored when `audit_enabled` is off; defaults to
    /// [`TracingAuditSink`] when it is on.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| WandelwerkError::Config("engine needs an artifact store".into()))?;

        let registry = Arc::new(self.registry.unwrap_or_else(CapabilityRegistry::standard));
        let mut adapters = self
            .adapters
            .unwrap_or_else(|| AdapterSet::standard(&self.config));
        for adapter in self.overrides {
            adapters.insert(adapter);
        }

        let tracker = Arc::new(JobTracker::new());
        for listener in self.listeners {
            tracker.add_listener(listener);
        }

        let mut dispatcher = Dispatcher::new(registry.clone(), adapters, tracker, store);
        if self.config.audit_enabled {
            let sink = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));
            dispatcher = dispatcher.with_audit(sink);
        }
        let dispatcher = Arc::new(dispatcher);

        info!(
            capabilities = registry.len(),
            max_concurrency = self.config.max_concurrency,
            audit = self.config.audit_enabled,
            "Engine ready"
        );
        Ok(Engine {
            batch: BatchExecutor::new(dispatcher.clone(), self.config.max_concurrency),
            dispatcher,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::{MockBackend, RecordingSink};
    use crate::job_store::SqliteJobStore;
    use crate::registry::BackendId;
    use crate::store::MemoryArtifactStore;
    use wandelwerk_core::error::ErrorKind;
    use wandelwerk_core::types::{JobStatus, OperationKind};

    fn engine_with(
        config: EngineConfig,
        store: Arc<MemoryArtifactStore>,
        sink: Arc<RecordingSink>,
    ) -> (Engine, Arc<MockBackend>) {
        let raster = MockBackend::new(BackendId::Raster);
        let engine = Engine::builder(config)
            .store(store)
            .adapters(AdapterSet::new())
            .adapter(raster.clone())
            .audit_sink(sink)
            .build()
            .unwrap();
        (engine, raster)
    }

    #[test]
    fn build_requires_a_store_and_valid_config() {
        assert!(Engine::builder(EngineConfig::default()).build().is_err());

        let config = EngineConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        let err = Engine::builder(config)
            .store(Arc::new(MemoryArtifactStore::new()))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn lists_targets_for_known_and_unknown_sources() {
        let engine = Engine::builder(EngineConfig::default())
            .store(Arc::new(MemoryArtifactStore::new()))
            .build()
            .unwrap();
        assert!(engine.list_supported_targets("docx").contains(&FileFormat::Pdf));
        assert!(engine.list_supported_targets("PNG").contains(&FileFormat::Jpeg));
        assert!(engine.list_supported_targets("xyz").is_empty());
    }

    #[tokio::test]
    async fn single_input_submission_runs_directly() {
        let store = Arc::new(MemoryArtifactStore::new());
        let input = store.insert("photo.png", b"png".to_vec());
        let sink = Arc::new(RecordingSink::default());
        let (engine, raster) = engine_with(EngineConfig::default(), store, sink.clone());

        let outcome = engine
            .submit(Submission::new(vec![input], FileFormat::Png, FileFormat::Jpeg, OperationKind::Convert))
            .await
            .unwrap();
        let SubmissionOutcome::Single { job_id, output } = outcome else {
            panic!("expected a single outcome");
        };
        assert!(output.artifact().is_some());
        assert_eq!(engine.tracker().status(job_id), Some(JobStatus::Completed));
        assert_eq!(raster.call_count(), 1);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn multi_input_submission_becomes_a_batch() {
        let store = Arc::new(MemoryArtifactStore::new());
        let inputs = vec![
            store.insert("a.png", b"png".to_vec()),
            store.insert("bad.png", b"png".to_vec()),
            store.insert("c.png", b"png".to_vec()),
        ];
        let sink = Arc::new(RecordingSink::default());
        let (engine, _) = engine_with(EngineConfig::default(), store, sink);

        let outcome = engine
            .submit(Submission::new(inputs, FileFormat::Png, FileFormat::Webp, OperationKind::Convert))
            .await
            .unwrap();
        let SubmissionOutcome::Batch(result) = outcome else {
            panic!("expected a batch outcome");
        };
        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.failures[0].kind, ErrorKind::BackendFailure);
    }

    #[tokio::test]
    async fn purged_jobs_are_forgotten_but_not_rerun() {
        let store = Arc::new(MemoryArtifactStore::new());
        let input = store.insert("photo.png", b"png".to_vec());
        let sink = Arc::new(RecordingSink::default());
        let (engine, raster) = engine_with(EngineConfig::default(), store, sink);

        let job = ConversionJob::single(FileFormat::Png, FileFormat::Jpeg, OperationKind::Convert, input);
        let id = job.id;
        engine.execute(job.clone()).await.unwrap();
        assert_eq!(engine.purge_finished(Utc::now() + chrono::Duration::seconds(1)).unwrap(), 1);
        assert_eq!(engine.tracker().status(id), None);
        assert_eq!(engine.tracker().counts().total(), 0);

        let err = engine.execute(job).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(raster.call_count(), 1);
    }

    #[tokio::test]
    async fn audit_disabled_drops_the_sink() {
        let store = Arc::new(MemoryArtifactStore::new());
        let input = store.insert("photo.png", b"png".to_vec());
        let sink = Arc::new(RecordingSink::default());
        let config = EngineConfig {
            audit_enabled: false,
            ..Default::default()
        };
        let (engine, _) = engine_with(config, store, sink.clone());

        engine
            .submit(Submission::new(vec![input], FileFormat::Png, FileFormat::Jpeg, OperationKind::Convert))
            .await
            .unwrap();
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listeners_see_submitted_jobs() {
        let store = Arc::new(MemoryArtifactStore::new());
        let input = store.insert("photo.png", b"png".to_vec());
        let jobs = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        let engine = Engine::builder(EngineConfig::default())
            .store(store)
            .adapters(AdapterSet::new())
            .listener(jobs.clone())
            .build()
            .unwrap();

        let outcome = engine
            .submit(Submission::new(vec![input], FileFormat::Png, FileFormat::Gif, OperationKind::Convert))
            .await;
        // No raster adapter installed: the job is persisted as failed.
        let err = outcome.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendFailure);
        let counts = jobs.status_counts().unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 1);
    }
}
