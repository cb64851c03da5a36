// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job tracker — owns the lifecycle state of every job.
//
// State machine:
//
//   pending ──► processing ──► completed
//      │             │
//      └─────────────┴───────► failed
//
// Transition rights are handed out as a `JobLease`: only the lease holder may
// move a job, and at most one lease per job exists at a time. Each job sits
// behind its own mutex so unrelated jobs never contend.
//
// Finished jobs can be purged; their ids stay behind as tombstones so a purged
// job is never registered again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{ConversionJob, JobId, JobOutput, JobStatus};

use crate::events::{TransitionEvent, TransitionListener};

#[derive(Debug)]
struct JobSlot {
    job: ConversionJob,
    claimed: bool,
}

type SharedSlot = Arc<Mutex<JobSlot>>;

/// Exclusive right to transition one job.
///
/// Completing or failing a job consumes the lease. Dropping it without a
/// terminal transition releases the claim so the job can be claimed again.
#[derive(Debug)]
pub struct JobLease {
    job_id: JobId,
    slot: SharedSlot,
}

impl JobLease {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.claimed = false;
        }
    }
}

/// Number of tracked jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: JobStatus, n: usize) {
        match status {
            JobStatus::Pending => self.pending += n,
            JobStatus::Processing => self.processing += n,
            JobStatus::Completed => self.completed += n,
            JobStatus::Failed => self.failed += n,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// In-memory registry of job state with lease-guarded transitions.
#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, SharedSlot>>,
    purged: RwLock<HashSet<JobId>>,
    listeners: RwLock<Vec<Arc<dyn TransitionListener>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every transition from now on.
    pub fn add_listener(&self, listener: Arc<dyn TransitionListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    // -- Registration ---------------------------------------------------------

    /// Start tracking a new job. It must be `pending` and not yet known.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn register(&self, job: ConversionJob) -> Result<JobId> {
        if job.status != JobStatus::Pending {
            return Err(WandelwerkError::Validation(format!(
                "job {} is {}; only pending jobs can be registered",
                job.id, job.status
            )));
        }
        let id = job.id;
        {
            let mut jobs = self.write_jobs()?;
            if jobs.contains_key(&id) {
                return Err(WandelwerkError::Validation(format!(
                    "job {id} is already registered"
                )));
            }
            if self.is_purged(id) {
                return Err(WandelwerkError::Validation(format!(
                    "job {id} already finished and was purged"
                )));
            }
            jobs.insert(
                id,
                Arc::new(Mutex::new(JobSlot {
                    job: job.clone(),
                    claimed: false,
                })),
            );
        }
        debug!("Job registered");
        for listener in self.listeners() {
            listener.on_registered(&job);
        }
        Ok(id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs
            .read()
            .map(|jobs| jobs.contains_key(&id))
            .unwrap_or(false)
    }

    /// Remove a job that is still pending and unclaimed (cancel before dispatch).
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn abandon(&self, id: JobId) -> Result<ConversionJob> {
        let mut jobs = self.write_jobs()?;
        let slot = jobs.get(&id).ok_or(WandelwerkError::UnknownJob(id))?;
        {
            let guard = lock_slot(slot)?;
            if guard.claimed {
                return Err(WandelwerkError::JobAlreadyClaimed(id));
            }
            if guard.job.status != JobStatus::Pending {
                return Err(WandelwerkError::Validation(format!(
                    "job {id} is {}; only pending jobs can be abandoned",
                    guard.job.status
                )));
            }
        }
        let slot = jobs.remove(&id).ok_or(WandelwerkError::UnknownJob(id))?;
        let job = lock_slot(&slot)?.job.clone();
        debug!("Job abandoned before dispatch");
        Ok(job)
    }

    /// Drop completed and failed jobs last updated before `before`.
    ///
    /// Returns how many were removed. Purged ids can never be registered again.
    #[instrument(skip(self))]
    pub fn purge_terminal(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut jobs = self.write_jobs()?;
        let mut purged = self.purged.write().map_err(|_| poisoned())?;
        let mut removed = 0;
        jobs.retain(|id, slot| {
            let expired = slot.lock().is_ok_and(|guard| {
                guard.job.status.is_terminal() && !guard.claimed && guard.job.updated_at < before
            });
            if expired {
                purged.insert(*id);
                removed += 1;
            }
            !expired
        });
        if removed > 0 {
            info!(removed, remaining = jobs.len(), "Finished jobs purged");
        }
        Ok(removed)
    }

    fn is_purged(&self, id: JobId) -> bool {
        self.purged
            .read()
            .map(|purged| purged.contains(&id))
            .unwrap_or(true)
    }

    // -- Leasing --------------------------------------------------------------

    /// Take exclusive transition rights over a job.
    pub fn claim(&self, id: JobId) -> Result<JobLease> {
        let slot = self.slot(id)?;
        {
            let mut guard = lock_slot(&slot)?;
            if guard.claimed {
                warn!(job_id = %id, "Second claim on a leased job refused");
                return Err(WandelwerkError::JobAlreadyClaimed(id));
            }
            if guard.job.status.is_terminal() {
                error!(job_id = %id, status = %guard.job.status, "Claim on a terminal job");
                return Err(WandelwerkError::InvalidTransition {
                    job: id,
                    from: guard.job.status,
                    to: JobStatus::Processing,
                });
            }
            guard.claimed = true;
        }
        Ok(JobLease { job_id: id, slot })
    }

    // -- Transitions ----------------------------------------------------------

    /// `pending -> processing`.
    pub fn start(&self, lease: &JobLease) -> Result<()> {
        self.transition(lease, JobStatus::Processing, |_| {})
    }

    /// `processing -> completed`, recording the output.
    pub fn complete(&self, lease: JobLease, output: JobOutput) -> Result<ConversionJob> {
        self.transition(&lease, JobStatus::Completed, |job| {
            job.output = Some(output);
        })?;
        self.snapshot_of(&lease)
    }

    /// `pending | processing -> failed`, recording the message verbatim.
    pub fn fail(&self, lease: JobLease, message: impl Into<String>) -> Result<ConversionJob> {
        let message = message.into();
        self.transition(&lease, JobStatus::Failed, |job| {
            job.error_message = Some(message);
        })?;
        self.snapshot_of(&lease)
    }

    fn transition(
        &self,
        lease: &JobLease,
        to: JobStatus,
        apply: impl FnOnce(&mut ConversionJob),
    ) -> Result<()> {
        let current = self.slot(lease.job_id)?;
        if !Arc::ptr_eq(&current, &lease.slot) {
            return Err(WandelwerkError::UnknownJob(lease.job_id));
        }

        let event = {
            let mut guard = lock_slot(&lease.slot)?;
            let from = guard.job.status;
            if !from.can_transition_to(to) {
                error!(job_id = %lease.job_id, %from, %to, "Illegal job transition");
                return Err(WandelwerkError::InvalidTransition {
                    job: lease.job_id,
                    from,
                    to,
                });
            }
            let now = Utc::now();
            guard.job.status = to;
            guard.job.updated_at = now;
            apply(&mut guard.job);
            TransitionEvent {
                job_id: lease.job_id,
                from,
                to,
                at: now,
                error_message: guard
                    .job
                    .error_message
                    .clone()
                    .filter(|_| to == JobStatus::Failed),
                output: guard
                    .job
                    .output
                    .clone()
                    .filter(|_| to == JobStatus::Completed),
            }
        };

        debug!(job_id = %event.job_id, from = %event.from, to = %event.to, "Job transitioned");
        self.emit(&event);
        Ok(())
    }

    fn emit(&self, event: &TransitionEvent) {
        for listener in self.listeners() {
            listener.on_transition(event);
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn TransitionListener>> {
        self.listeners
            .read()
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }

    // -- Queries --------------------------------------------------------------

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.snapshot(id).map(|job| job.status)
    }

    /// A copy of the job's current record.
    pub fn snapshot(&self, id: JobId) -> Option<ConversionJob> {
        let slot = self.slot(id).ok()?;
        let guard = slot.lock().ok()?;
        Some(guard.job.clone())
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        let slots: Vec<SharedSlot> = match self.jobs.read() {
            Ok(jobs) => jobs.values().cloned().collect(),
            Err(_) => return counts,
        };
        for slot in slots {
            if let Ok(guard) = slot.lock() {
                counts.add(guard.job.status, 1);
            }
        }
        counts
    }

    // -- Helpers --------------------------------------------------------------

    fn slot(&self, id: JobId) -> Result<SharedSlot> {
        self.jobs
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or(WandelwerkError::UnknownJob(id))
    }

    fn snapshot_of(&self, lease: &JobLease) -> Result<ConversionJob> {
        Ok(lock_slot(&lease.slot)?.job.clone())
    }

    fn write_jobs(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<JobId, SharedSlot>>> {
        self.jobs.write().map_err(|_| poisoned())
    }
}

fn lock_slot(slot: &SharedSlot) -> Result<MutexGuard<'_, JobSlot>> {
    slot.lock().map_err(|_| poisoned())
}

fn poisoned() -> WandelwerkError {
    WandelwerkError::Storage("job tracker lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wandelwerk_core::types::{FileFormat, OperationKind};

    fn job() -> ConversionJob {
        ConversionJob::single(FileFormat::Png, FileFormat::Jpeg, OperationKind::Convert, "in.png")
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TransitionEvent>>);

    impl TransitionListener for Recorder {
        fn on_transition(&self, event: &TransitionEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn happy_path_emits_two_transitions() {
        let tracker = JobTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker.add_listener(recorder.clone());

        let id = tracker.register(job()).unwrap();
        let lease = tracker.claim(id).unwrap();
        tracker.start(&lease).unwrap();
        assert_eq!(tracker.status(id), Some(JobStatus::Processing));

        let done = tracker
            .complete(lease, JobOutput::Text { text: "hi".into(), language: "eng".into() })
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.output.is_some());

        let events = recorder.0.lock().unwrap();
        let edges: Vec<_> = events.iter().map(|e| (e.from, e.to)).collect();
        assert_eq!(
            edges,
            vec![
                (JobStatus::Pending, JobStatus::Processing),
                (JobStatus::Processing, JobStatus::Completed)
            ]
        );
    }

    #[test]
    fn second_claim_is_refused_until_lease_dropped() {
        let tracker = JobTracker::new();
        let id = tracker.register(job()).unwrap();

        let lease = tracker.claim(id).unwrap();
        assert!(matches!(tracker.claim(id), Err(WandelwerkError::JobAlreadyClaimed(_))));
        drop(lease);
        assert!(tracker.claim(id).is_ok());
    }

    #[test]
    fn pending_can_fail_directly() {
        let tracker = JobTracker::new();
        let id = tracker.register(job()).unwrap();
        let lease = tracker.claim(id).unwrap();
        let failed = tracker.fail(lease, "crop region out of bounds").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("crop region out of bounds"));
    }

    #[test]
    fn terminal_jobs_cannot_be_claimed_or_moved() {
        let tracker = JobTracker::new();
        let id = tracker.register(job()).unwrap();
        let lease = tracker.claim(id).unwrap();
        tracker.fail(lease, "boom").unwrap();

        let err = tracker.claim(id).unwrap_err();
        assert!(matches!(
            err,
            WandelwerkError::InvalidTransition { from: JobStatus::Failed, .. }
        ));
        assert_eq!(tracker.status(id), Some(JobStatus::Failed));
    }

    #[test]
    fn completing_a_pending_job_is_illegal() {
        let tracker = JobTracker::new();
        let id = tracker.register(job()).unwrap();
        let lease = tracker.claim(id).unwrap();
        let err = tracker
            .complete(lease, JobOutput::Text { text: String::new(), language: "eng".into() })
            .unwrap_err();
        assert!(matches!(err, WandelwerkError::InvalidTransition { .. }));
        assert_eq!(tracker.status(id), Some(JobStatus::Pending));
        // The failed attempt consumed the lease and released the claim.
        assert!(tracker.claim(id).is_ok());
    }

    #[test]
    fn abandon_only_pending_unclaimed() {
        let tracker = JobTracker::new();
        let id = tracker.register(job()).unwrap();
        let lease = tracker.claim(id).unwrap();
        assert!(matches!(tracker.abandon(id), Err(WandelwerkError::JobAlreadyClaimed(_))));
        drop(lease);

        let abandoned = tracker.abandon(id).unwrap();
        assert_eq!(abandoned.id, id);
        assert!(!tracker.contains(id));
        assert!(matches!(tracker.claim(id), Err(WandelwerkError::UnknownJob(_))));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let tracker = JobTracker::new();
        let j = job();
        tracker.register(j.clone()).unwrap();
        assert!(tracker.register(j).is_err());
    }

    #[test]
    fn purge_drops_finished_jobs_and_refuses_them_afterwards() {
        let tracker = JobTracker::new();
        let mut failed = Vec::new();
        for _ in 0..1000 {
            let j = job();
            let id = tracker.register(j.clone()).unwrap();
            tracker.fail(tracker.claim(id).unwrap(), "boom").unwrap();
            failed.push(j);
        }
        let pending = tracker.register(job()).unwrap();
        assert_eq!(tracker.counts().total(), 1001);

        let removed = tracker.purge_terminal(Utc::now() + chrono::Duration::seconds(1)).unwrap();
        assert_eq!(removed, 1000);
        let counts = tracker.counts();
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(tracker.status(pending), Some(JobStatus::Pending));

        let again = failed.swap_remove(0);
        let id = again.id;
        assert!(matches!(tracker.register(again), Err(WandelwerkError::Validation(_))));
        assert!(matches!(tracker.claim(id), Err(WandelwerkError::UnknownJob(_))));
    }

    #[test]
    fn purge_keeps_recently_finished_jobs() {
        let tracker = JobTracker::new();
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let id = tracker.register(job()).unwrap();
        tracker.fail(tracker.claim(id).unwrap(), "boom").unwrap();

        assert_eq!(tracker.purge_terminal(cutoff).unwrap(), 0);
        assert_eq!(tracker.status(id), Some(JobStatus::Failed));
    }

    #[test]
    fn counts_by_status() {
        let tracker = JobTracker::new();
        let a = tracker.register(job()).unwrap();
        tracker.register(job()).unwrap();
        let lease = tracker.claim(a).unwrap();
        tracker.fail(lease, "x").unwrap();

        let counts = tracker.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 2);
    }
}
