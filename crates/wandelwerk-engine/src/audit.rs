// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of completed transformations and batches.
//
// Schema:
//   audit_log(
//     id        INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp TEXT    NOT NULL,   -- RFC 3339
//     user_id   TEXT,               -- job owner, if any
//     action    TEXT    NOT NULL,   -- "transform" | "batch"
//     job_id    TEXT,               -- set for single-job events
//     metadata  TEXT    NOT NULL    -- JSON object
//   )

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};

use crate::events::{AuditEvent, AuditSink};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    user_id   TEXT,
    action    TEXT    NOT NULL,
    job_id    TEXT,
    metadata  TEXT    NOT NULL
);";

fn db_err(e: rusqlite::Error) -> WandelwerkError {
    WandelwerkError::Database(e.to_string())
}

/// A stored audit row, as returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_id: Option<String>,
    pub action: String,
    pub job_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[instrument(skip(self, event), fields(action = event.action.as_str()))]
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        let metadata = serde_json::to_string(&event.metadata)?;
        self.lock()?
            .execute(
                "INSERT INTO audit_log (timestamp, user_id, action, job_id, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.at.to_rfc3339(),
                    event.user_id,
                    event.action.as_str(),
                    event.job_id.map(|id| id.to_string()),
                    metadata,
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.query(
            "SELECT id, timestamp, user_id, action, job_id, metadata
             FROM audit_log ORDER BY id DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Every entry for `user_id`, oldest first.
    pub fn entries_for_user(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        self.query(
            "SELECT id, timestamp, user_id, action, job_id, metadata
             FROM audit_log WHERE user_id = ?1 ORDER BY id ASC",
            params![user_id],
        )
    }

    pub fn count(&self) -> Result<i64> {
        self.lock()?
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, |row| {
                let metadata: String = row.get(5)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    user_id: row.get(2)?,
                    action: row.get(3)?,
                    job_id: row.get(4)?,
                    metadata: serde_json::from_str(&metadata)
                        .unwrap_or(serde_json::Value::String(metadata)),
                })
            })
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WandelwerkError::Database("audit log lock poisoned".into()))
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        self.append(event)
    }
}
