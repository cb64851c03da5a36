// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution and layout.

use std::path::{Path, PathBuf};

/// Where artifacts, the job database and the audit log live.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Use `explicit` if given, otherwise the conventional per-user location.
    pub fn resolve(explicit: Option<PathBuf>) -> std::io::Result<Self> {
        let root = explicit.unwrap_or_else(|| default_base().join("wandelwerk"));
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifacts(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn jobs_db(&self) -> PathBuf {
        self.root.join("jobs.db")
    }

    pub fn audit_db(&self) -> PathBuf {
        self.root.join("audit.db")
    }
}

fn default_base() -> PathBuf {
    // XDG data dir, then ~/.local/share
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path().join("nested"))).unwrap();
        assert!(dir.root().is_dir());
        assert_eq!(dir.jobs_db(), tmp.path().join("nested").join("jobs.db"));
    }
}
