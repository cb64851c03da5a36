// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch executor — many jobs, one result, per-item isolation.
//
// Only batch-shaped problems (empty, mixed operations, wrong cardinality,
// duplicate ids) fail the call. After that, every per-job error is data in
// the `BatchResult` and the remaining jobs still run.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use wandelwerk_core::error::{ErrorKind, Result, WandelwerkError};
use wandelwerk_core::types::{ConversionJob, JobId, JobOutput};

use crate::dispatcher::Dispatcher;
use crate::events::{AuditAction, AuditEvent};
use crate::inspect::check_cardinality;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSuccess {
    pub job_id: JobId,
    pub output: JobOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub job_id: JobId,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Outcome of a batch. Both sequences are in input order, and every input
/// job id appears in exactly one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub successes: Vec<BatchSuccess>,
    pub failures: Vec<BatchFailure>,
    pub summary: BatchSummary,
}

impl BatchResult {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    fn push(&mut self, job_id: JobId, outcome: Result<JobOutput>) {
        match outcome {
            Ok(output) => self.successes.push(BatchSuccess { job_id, output }),
            Err(err) => self.failures.push(BatchFailure {
                job_id,
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
        self.summary = BatchSummary {
            total: self.successes.len() + self.failures.len(),
            succeeded: self.successes.len(),
            failed: self.failures.len(),
        };
    }
}

pub struct BatchExecutor {
    dispatcher: Arc<Dispatcher>,
    max_concurrency: usize,
}

impl BatchExecutor {
    /// `max_concurrency` caps simultaneous backend invocations; 1 is sequential.
    pub fn new(dispatcher: Arc<Dispatcher>, max_concurrency: usize) -> Self {
        Self {
            dispatcher,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Batch preconditions. Nothing is registered or transitioned here.
    pub fn validate(jobs: &[ConversionJob]) -> Result<()> {
        let Some(first) = jobs.first() else {
            return Err(WandelwerkError::Validation("batch is empty".into()));
        };

        let mut seen = HashSet::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            if (job.source_format, job.target_format, job.operation)
                != (first.source_format, first.target_format, first.operation)
            {
                return Err(WandelwerkError::Validation(format!(
                    "job #{} is {} {} -> {}, batch is {} {} -> {}",
                    index + 1,
                    job.operation,
                    job.source_format,
                    job.target_format,
                    first.operation,
                    first.source_format,
                    first.target_format
                )));
            }
            check_cardinality(job.operation, job.inputs.len()).map_err(|err| match err {
                WandelwerkError::Validation(msg) => {
                    WandelwerkError::Validation(format!("job #{}: {msg}", index + 1))
                }
                other => other,
            })?;
            if !seen.insert(job.id) {
                return Err(WandelwerkError::Validation(format!(
                    "job id {} appears more than once",
                    job.id
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(jobs = jobs.len(), concurrency = self.max_concurrency))]
    pub async fn execute_batch(&self, jobs: Vec<ConversionJob>) -> Result<BatchResult> {
        Self::validate(&jobs)?;
        let owner = jobs.first().and_then(|job| job.owner.clone());
        let operation = jobs.first().map(|job| job.operation);

        let dispatcher = &self.dispatcher;
        let mut outcomes: Vec<(usize, JobId, Result<JobOutput>)> =
            stream::iter(jobs.into_iter().enumerate())
                .map(|(index, job)| async move {
                    let id = job.id;
                    (index, id, dispatcher.execute(job).await)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, ..)| *index);

        let mut result = BatchResult::default();
        for (_, job_id, outcome) in outcomes {
            result.push(job_id, outcome);
        }

        info!(
            total = result.summary.total,
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            "Batch finished"
        );
        self.dispatcher.emit_audit(
            &AuditEvent::new(
                AuditAction::Batch,
                json!({
                    "operation": operation,
                    "total": result.summary.total,
                    "succeeded": result.summary.succeeded,
                    "failed": result.summary.failed,
                }),
            )
            .by_user(owner),
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterSet, RasterBackend, testing};
    use crate::dispatcher::tests::{MockBackend, RecordingSink};
    use crate::registry::{BackendId, CapabilityRegistry};
    use crate::store::MemoryArtifactStore;
    use crate::tracker::JobTracker;
    use wandelwerk_core::config::EngineConfig;
    use wandelwerk_core::types::{ArtifactHandle, FileFormat, JobStatus, OperationKind};

    struct Harness {
        executor: BatchExecutor,
        tracker: Arc<JobTracker>,
        store: Arc<MemoryArtifactStore>,
        raster: Arc<MockBackend>,
        merge: Arc<MockBackend>,
        sink: Arc<RecordingSink>,
    }

    fn harness(concurrency: usize) -> Harness {
        let store = Arc::new(MemoryArtifactStore::new());
        let tracker = Arc::new(JobTracker::new());
        let raster = MockBackend::new(BackendId::Raster);
        let merge = MockBackend::new(BackendId::PdfMerge);
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            Arc::new(CapabilityRegistry::standard()),
            AdapterSet::new().with(raster.clone()).with(merge.clone()),
            tracker.clone(),
            store.clone(),
        )
        .with_audit(sink.clone());
        Harness {
            executor: BatchExecutor::new(Arc::new(dispatcher), concurrency),
            tracker,
            store,
            raster,
            merge,
            sink,
        }
    }

    fn png_jobs(store: &MemoryArtifactStore, names: &[&str]) -> Vec<ConversionJob> {
        names
            .iter()
            .map(|name| {
                let handle = store.insert(*name, b"png".to_vec());
                ConversionJob::single(FileFormat::Png, FileFormat::Jpeg, OperationKind::Convert, handle)
            })
            .collect()
    }

    #[tokio::test]
    async fn missing_artifact_is_a_resource_failure_for_that_job_only() {
        let store = Arc::new(MemoryArtifactStore::new());
        let tracker = Arc::new(JobTracker::new());
        let dispatcher = Dispatcher::new(
            Arc::new(CapabilityRegistry::standard()),
            AdapterSet::new().with(Arc::new(RasterBackend::from_config(&EngineConfig::default()))),
            tracker.clone(),
            store.clone(),
        );
        let executor = BatchExecutor::new(Arc::new(dispatcher), 2);

        let handles = vec![
            store.insert("a.png", testing::png(6, 4)),
            ArtifactHandle::new("gone.png"),
            store.insert("c.png", testing::png(4, 6)),
        ];
        let jobs: Vec<ConversionJob> = handles
            .into_iter()
            .map(|h| ConversionJob::single(FileFormat::Png, FileFormat::Jpeg, OperationKind::Convert, h))
            .collect();
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();

        let result = executor.execute_batch(jobs).await.unwrap();
        assert_eq!(result.summary, BatchSummary { total: 3, succeeded: 2, failed: 1 });
        assert_eq!(result.failures[0].job_id, ids[1]);
        assert_eq!(result.failures[0].kind, ErrorKind::Resource);
        assert_eq!(tracker.status(ids[1]), Some(JobStatus::Failed));
        assert_eq!(tracker.status(ids[0]), Some(JobStatus::Completed));
        assert_eq!(tracker.status(ids[2]), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn one_corrupt_input_does_not_abort_the_batch() {
        let h = harness(4);
        let jobs = png_jobs(&h.store, &["a.png", "bb.png", "bad.png", "dddd.png", "e.png"]);
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();

        let result = h.executor.execute_batch(jobs).await.unwrap();
        assert_eq!(result.summary, BatchSummary { total: 5, succeeded: 4, failed: 1 });
        assert_eq!(result.failures[0].job_id, ids[2]);
        assert_eq!(result.failures[0].kind, ErrorKind::BackendFailure);

        let success_ids: Vec<JobId> = result.successes.iter().map(|s| s.job_id).collect();
        assert_eq!(success_ids, vec![ids[0], ids[1], ids[3], ids[4]]);

        assert_eq!(h.tracker.status(ids[2]), Some(JobStatus::Failed));
        for id in [ids[0], ids[1], ids[3], ids[4]] {
            assert_eq!(h.tracker.status(id), Some(JobStatus::Completed));
        }
        assert_eq!(h.raster.call_count(), 5);
    }

    #[tokio::test]
    async fn jpeg_to_png_with_corrupt_middle_job() {
        let h = harness(1);
        let jobs: Vec<ConversionJob> = ["one.jpg", "bad.jpg", "three.jpg"]
            .iter()
            .map(|name| {
                let handle = h.store.insert(*name, b"jpg".to_vec());
                ConversionJob::single(FileFormat::Jpeg, FileFormat::Png, OperationKind::Convert, handle)
            })
            .collect();
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();

        let result = h.executor.execute_batch(jobs).await.unwrap();
        let success_ids: Vec<JobId> = result.successes.iter().map(|s| s.job_id).collect();
        assert_eq!(success_ids, vec![ids[0], ids[2]]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].job_id, ids[1]);
        assert_eq!(result.failures[0].kind, ErrorKind::BackendFailure);
        assert_eq!(result.failures[0].message, "image processing failed: corrupt input");
    }

    #[tokio::test]
    async fn results_follow_input_order_at_any_concurrency() {
        for concurrency in [1, 3, 16] {
            let h = harness(concurrency);
            let names = ["dddd.png", "a.png", "ccc.png", "bb.png", "bad1.png", "x.png"];
            let jobs = png_jobs(&h.store, &names);
            let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();

            let result = h.executor.execute_batch(jobs).await.unwrap();
            let mut seen: Vec<JobId> = result
                .successes
                .iter()
                .map(|s| s.job_id)
                .chain(result.failures.iter().map(|f| f.job_id))
                .collect();
            assert_eq!(seen.len(), ids.len());
            seen.sort();
            let mut expected = ids.clone();
            expected.sort();
            assert_eq!(seen, expected);

            let success_positions: Vec<usize> = result
                .successes
                .iter()
                .map(|s| ids.iter().position(|id| *id == s.job_id).unwrap())
                .collect();
            assert!(success_positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn merge_with_one_input_rejects_whole_batch() {
        let h = harness(2);
        let only = h.store.insert("a.pdf", b"%PDF".to_vec());
        let job = ConversionJob::new(FileFormat::Pdf, FileFormat::Pdf, OperationKind::Merge, vec![only]);
        let id = job.id;

        let err = h.executor.execute_batch(vec![job]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("at least 2 required"));
        assert_eq!(h.merge.call_count(), 0);
        assert!(!h.tracker.contains(id));
        assert!(h.sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_operations_and_empty_batches_are_rejected() {
        let h = harness(2);
        assert!(h.executor.execute_batch(Vec::new()).await.is_err());

        let mut jobs = png_jobs(&h.store, &["a.png", "b.png"]);
        jobs[1].target_format = FileFormat::Webp;
        let err = h.executor.execute_batch(jobs).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.raster.call_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let h = harness(2);
        let jobs = png_jobs(&h.store, &["a.png"]);
        let twice = vec![jobs[0].clone(), jobs[0].clone()];
        assert!(h.executor.execute_batch(twice).await.is_err());
    }

    #[tokio::test]
    async fn merge_batch_runs_and_audits_once() {
        let h = harness(2);
        let a = h.store.insert("a.pdf", b"%PDF".to_vec());
        let b = h.store.insert("b.pdf", b"%PDF".to_vec());
        let job = ConversionJob::new(
            FileFormat::Pdf,
            FileFormat::Pdf,
            OperationKind::Merge,
            vec![a.clone(), b.clone()],
        )
        .with_owner("carol");

        let result = h.executor.execute_batch(vec![job]).await.unwrap();
        assert!(result.all_succeeded());
        assert_eq!(*h.merge.calls.lock().unwrap(), vec![a, b]);

        let events = h.sink.0.lock().unwrap();
        let batch_events: Vec<_> = events.iter().filter(|e| e.action == AuditAction::Batch).collect();
        assert_eq!(batch_events.len(), 1);
        assert_eq!(batch_events[0].metadata["succeeded"], 1);
        assert_eq!(batch_events[0].user_id.as_deref(), Some("carol"));
    }
}
