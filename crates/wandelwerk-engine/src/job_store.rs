// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent job records backed by SQLite.
//
// The store holds job metadata only. Input and output bytes live in the
// artifact store and are referenced by handle. Attached to a `JobTracker` as
// a `TransitionListener`, it mirrors every state change to disk so the job
// history survives restarts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{ConversionJob, JobId, JobStatus};

use crate::events::{TransitionEvent, TransitionListener};
use crate::tracker::StatusCounts;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        source_format TEXT NOT NULL,
        target_format TEXT NOT NULL,
        operation TEXT NOT NULL,
        inputs TEXT NOT NULL,
        options TEXT NOT NULL,
        status TEXT NOT NULL,
        owner TEXT,
        output TEXT,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS jobs_status ON jobs (status, created_at);
"#;

const SELECT_COLUMNS: &str = "SELECT id, source_format, target_format, operation, inputs,
        options, status, owner, output, error_message, created_at, updated_at
 FROM jobs";

/// SQLite-backed job history.
///
/// `rusqlite` is synchronous; calls block briefly on the connection mutex.
/// From async code, prefer `tokio::task::spawn_blocking` for bulk queries.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| WandelwerkError::Database(format!("open: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| WandelwerkError::Database(format!("WAL pragma: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| WandelwerkError::Database(format!("create table: {e}")))?;

        info!("job database opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| WandelwerkError::Database(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| WandelwerkError::Database(format!("create table: {e}")))?;

        debug!("in-memory job database opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert a job, replacing any previous record with the same id.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn insert_job(&self, job: &ConversionJob) -> Result<()> {
        let output = job.output.as_ref().map(|o| to_json("output", o)).transpose()?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO jobs (id, source_format, target_format, operation,
                 inputs, options, status, owner, output, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    job.id.to_string(),
                    to_json("source_format", &job.source_format)?,
                    to_json("target_format", &job.target_format)?,
                    to_json("operation", &job.operation)?,
                    to_json("inputs", &job.inputs)?,
                    to_json("options", &job.options)?,
                    to_json("status", &job.status)?,
                    job.owner,
                    output,
                    job.error_message,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| WandelwerkError::Database(format!("insert job: {e}")))?;

        debug!("job stored");
        Ok(())
    }

    /// Apply a tracker transition to the stored record.
    #[instrument(skip(self, event), fields(job_id = %event.job_id, to = %event.to))]
    pub fn apply_transition(&self, event: &TransitionEvent) -> Result<()> {
        let output = event
            .output
            .as_ref()
            .map(|o| to_json("output", o))
            .transpose()?;
        let rows = self
            .lock()?
            .execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2,
                    error_message = COALESCE(?3, error_message),
                    output = COALESCE(?4, output)
                 WHERE id = ?5",
                params![
                    to_json("status", &event.to)?,
                    event.at.to_rfc3339(),
                    event.error_message,
                    output,
                    event.job_id.to_string(),
                ],
            )
            .map_err(|e| WandelwerkError::Database(format!("update status: {e}")))?;

        if rows == 0 {
            return Err(WandelwerkError::Database(format!(
                "job {} not found",
                event.job_id
            )));
        }
        Ok(())
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<ConversionJob>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .map_err(|e| WandelwerkError::Database(format!("prepare get_job: {e}")))?;

        let mut rows = stmt
            .query_map(params![job_id.to_string()], row_to_job)
            .map_err(|e| WandelwerkError::Database(format!("query get_job: {e}")))?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(WandelwerkError::Database(format!("row parse: {e}"))),
            None => Ok(None),
        }
    }

    /// Jobs in `status`, oldest first.
    pub fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<ConversionJob>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at ASC"
            ))
            .map_err(|e| WandelwerkError::Database(format!("prepare jobs_with_status: {e}")))?;

        let jobs = stmt
            .query_map(params![to_json("status", &status)?], row_to_job)
            .map_err(|e| WandelwerkError::Database(format!("query jobs_with_status: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| WandelwerkError::Database(format!("collect rows: {e}")))?;
        Ok(jobs)
    }

    pub fn status_counts(&self) -> Result<StatusCounts> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .map_err(|e| WandelwerkError::Database(format!("prepare status_counts: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| WandelwerkError::Database(format!("query status_counts: {e}")))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row.map_err(|e| WandelwerkError::Database(e.to_string()))?;
            let status: JobStatus = serde_json::from_str(&status)
                .map_err(|e| WandelwerkError::Database(format!("bad status {status}: {e}")))?;
            counts.add(status, n.max(0) as usize);
        }
        Ok(counts)
    }

    /// Delete terminal jobs last updated before `cutoff`. Returns rows removed.
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self
            .lock()?
            .execute(
                "DELETE FROM jobs WHERE status IN (?1, ?2) AND updated_at < ?3",
                params![
                    to_json("status", &JobStatus::Completed)?,
                    to_json("status", &JobStatus::Failed)?,
                    cutoff.to_rfc3339(),
                ],
            )
            .map_err(|e| WandelwerkError::Database(format!("purge: {e}")))?;
        info!(removed, "finished jobs purged");
        Ok(removed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WandelwerkError::Database("job database lock poisoned".into()))
    }
}

impl TransitionListener for SqliteJobStore {
    fn on_registered(&self, job: &ConversionJob) {
        if let Err(err) = self.insert_job(job) {
            warn!(job_id = %job.id, error = %err, "Failed to persist new job");
        }
    }

    fn on_transition(&self, event: &TransitionEvent) {
        if let Err(err) = self.apply_transition(event) {
            warn!(job_id = %event.job_id, error = %err, "Failed to persist job transition");
        }
    }
}

fn to_json<T: Serialize>(field: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| WandelwerkError::Database(format!("serialize {field}: {e}")))
}

fn column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversionJob> {
    let id: String = row.get(0)?;
    let id: JobId = id.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let output: Option<String> = row.get(8)?;
    let output = output
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ConversionJob {
        id,
        source_format: column(row, 1)?,
        target_format: column(row, 2)?,
        operation: column(row, 3)?,
        inputs: column(row, 4)?,
        options: column(row, 5)?,
        status: column(row, 6)?,
        owner: row.get(7)?,
        output,
        error_message: row.get(9)?,
        created_at: timestamp(row, 10)?,
        updated_at: timestamp(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wandelwerk_core::types::{
        ArtifactHandle, FileFormat, JobOutput, OperationKind, OutputArtifact,
    };

    use crate::tracker::JobTracker;

    fn job() -> ConversionJob {
        ConversionJob::single(FileFormat::Docx, FileFormat::Pdf, OperationKind::Convert, "a.docx")
            .with_owner("alice")
    }

    #[test]
    fn insert_and_read_back() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let job = job();
        store.insert_job(&job).unwrap();

        let loaded = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.source_format, FileFormat::Docx);
        assert_eq!(loaded.operation, OperationKind::Convert);
        assert_eq!(loaded.inputs, vec![ArtifactHandle::new("a.docx")]);
        assert_eq!(loaded.owner.as_deref(), Some("alice"));
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[test]
    fn missing_job_is_none() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        assert!(store.get_job(JobId::new()).unwrap().is_none());
    }

    #[test]
    fn mirrors_tracker_transitions() {
        let store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        let tracker = JobTracker::new();
        tracker.add_listener(store.clone());

        let ok = job();
        let bad = job();
        tracker.register(ok.clone()).unwrap();
        tracker.register(bad.clone()).unwrap();

        let lease = tracker.claim(ok.id).unwrap();
        tracker.start(&lease).unwrap();
        let output = JobOutput::Artifact(OutputArtifact {
            handle: ArtifactHandle::new("out.pdf"),
            filename: "a.pdf".into(),
            size: 42,
            format: FileFormat::Pdf,
        });
        tracker.complete(lease, output.clone()).unwrap();

        let lease = tracker.claim(bad.id).unwrap();
        tracker.fail(lease, "office engine not found").unwrap();

        let ok_row = store.get_job(ok.id).unwrap().unwrap();
        assert_eq!(ok_row.status, JobStatus::Completed);
        assert_eq!(ok_row.output, Some(output));

        let bad_row = store.get_job(bad.id).unwrap().unwrap();
        assert_eq!(bad_row.status, JobStatus::Failed);
        assert_eq!(bad_row.error_message.as_deref(), Some("office engine not found"));

        let counts = store.status_counts().unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(store.jobs_with_status(JobStatus::Failed).unwrap().len(), 1);
    }

    #[test]
    fn transition_for_unknown_job_errors() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let event = TransitionEvent {
            job_id: JobId::new(),
            from: JobStatus::Pending,
            to: JobStatus::Processing,
            at: Utc::now(),
            error_message: None,
            output: None,
        };
        assert!(store.apply_transition(&event).is_err());
        // The listener path swallows the error.
        store.on_transition(&event);
    }

    #[test]
    fn purge_removes_only_old_terminal_jobs() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let mut done = job();
        done.status = JobStatus::Completed;
        done.updated_at = Utc::now() - chrono::Duration::days(10);
        let pending = job();
        store.insert_job(&done).unwrap();
        store.insert_job(&pending).unwrap();

        let removed = store
            .purge_finished_before(Utc::now() - chrono::Duration::days(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_job(pending.id).unwrap().is_some());
    }
}
