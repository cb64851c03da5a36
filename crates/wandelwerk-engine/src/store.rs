// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact stores — where adapters read their inputs and write their outputs.
//
// Handles are opaque to the engine. The local store names files after the
// SHA-256 of their content so identical outputs are stored once.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::ArtifactHandle;

/// Hex characters of the content hash kept in local file names.
const HASH_PREFIX_LEN: usize = 16;

/// Byte storage addressed by [`ArtifactHandle`].
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>>;

    /// Store `bytes` and return a handle to them. `filename_hint` only
    /// influences naming; stores may ignore it.
    async fn write(&self, bytes: Vec<u8>, filename_hint: &str) -> Result<ArtifactHandle>;

    async fn size(&self, handle: &ArtifactHandle) -> Result<u64>;
}

/// Compute the SHA-256 hash of `data` as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Reduce a caller-supplied file name to a safe single path component.
pub fn sanitize_filename(hint: &str) -> String {
    let base = hint.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned.to_string()
    }
}

// ---------------------------------------------------------------------------
// Local directory store
// ---------------------------------------------------------------------------

/// Stores artifacts as files in a single directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    /// Use `root` as the store directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|err| {
            WandelwerkError::Storage(format!("cannot create {}: {err}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register an existing file under the store root and return its handle.
    pub fn handle_for(&self, file_name: &str) -> Result<ArtifactHandle> {
        let handle = ArtifactHandle::new(file_name);
        self.resolve(&handle)?;
        Ok(handle)
    }

    /// Map a handle to a path, refusing anything that could leave the root.
    fn resolve(&self, handle: &ArtifactHandle) -> Result<PathBuf> {
        let relative = Path::new(handle.as_str());
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(relative)),
            _ => Err(WandelwerkError::Storage(format!(
                "handle {handle:?} is not a plain file name inside the store"
            ))),
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    #[instrument(skip(self), fields(%handle))]
    async fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        let path = self.resolve(handle)?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| WandelwerkError::Storage(format!("cannot read {handle}: {err}")))
    }

    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len(), filename_hint))]
    async fn write(&self, bytes: Vec<u8>, filename_hint: &str) -> Result<ArtifactHandle> {
        let digest = hash_bytes(&bytes);
        let name = format!(
            "{}_{}",
            &digest[..HASH_PREFIX_LEN],
            sanitize_filename(filename_hint)
        );
        let handle = ArtifactHandle::new(name);
        let path = self.resolve(&handle)?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|err| WandelwerkError::Storage(format!("cannot write {handle}: {err}")))?;
        debug!(%handle, "Artifact stored");
        Ok(handle)
    }

    async fn size(&self, handle: &ArtifactHandle) -> Result<u64> {
        let path = self.resolve(handle)?;
        tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.len())
            .map_err(|err| WandelwerkError::Storage(format!("cannot stat {handle}: {err}")))
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<ArtifactHandle, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store under a caller-chosen handle.
    pub fn insert(&self, handle: impl Into<ArtifactHandle>, bytes: Vec<u8>) -> ArtifactHandle {
        let handle = handle.into();
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(handle.clone(), bytes);
        }
        handle
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> WandelwerkError {
        WandelwerkError::Storage("memory store lock poisoned".into())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        objects
            .get(handle)
            .cloned()
            .ok_or_else(|| WandelwerkError::Storage(format!("no artifact {handle}")))
    }

    async fn write(&self, bytes: Vec<u8>, filename_hint: &str) -> Result<ArtifactHandle> {
        let handle = ArtifactHandle::new(format!(
            "mem-{}-{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_filename(filename_hint)
        ));
        self.objects
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(handle.clone(), bytes);
        Ok(handle)
    }

    async fn size(&self, handle: &ArtifactHandle) -> Result<u64> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        objects
            .get(handle)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| WandelwerkError::Storage(format!("no artifact {handle}")))
    }
}
