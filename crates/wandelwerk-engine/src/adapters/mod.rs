// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend adapters — one per transformation family, all behind the same
// `TransformBackend` contract. The dispatcher only ever sees the trait.

pub mod cleanup;
pub mod ocr;
pub mod office;
pub mod pdf_edit;
pub mod pdf_merge;
pub mod raster;
pub mod vector;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use wandelwerk_core::config::EngineConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::TransformOptions;
use wandelwerk_core::types::{
    ArtifactHandle, ConversionJob, FileFormat, JobId, JobOutput, OperationKind, OutputArtifact,
};

use crate::registry::BackendId;
use crate::store::ArtifactStore;

pub use cleanup::ImageCleanupBackend;
pub use ocr::OcrBackend;
pub use office::OfficeBackend;
pub use pdf_edit::PdfEditBackend;
pub use pdf_merge::PdfMergeBackend;
pub use raster::RasterBackend;
pub use vector::VectorBackend;

/// Everything an adapter needs to run one job.
#[derive(Clone)]
pub struct TransformRequest {
    pub job_id: JobId,
    pub inputs: Vec<ArtifactHandle>,
    pub operation: OperationKind,
    pub source: FileFormat,
    pub target: FileFormat,
    pub options: TransformOptions,
    pub store: Arc<dyn ArtifactStore>,
}

impl fmt::Debug for TransformRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRequest")
            .field("job_id", &self.job_id)
            .field("inputs", &self.inputs)
            .field("operation", &self.operation)
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl TransformRequest {
    pub fn from_job(job: &ConversionJob, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            job_id: job.id,
            inputs: job.inputs.clone(),
            operation: job.operation,
            source: job.source_format,
            target: job.target_format,
            options: job.options.clone(),
            store,
        }
    }

    /// Bytes of the first input.
    pub async fn read_primary(&self) -> Result<Vec<u8>> {
        let handle = self
            .inputs
            .first()
            .ok_or_else(|| WandelwerkError::Validation("job has no input".into()))?;
        self.store.read(handle).await
    }

    /// Bytes of every input, in input order.
    pub async fn read_all(&self) -> Result<Vec<Vec<u8>>> {
        futures::future::try_join_all(self.inputs.iter().map(|h| self.store.read(h))).await
    }

    /// Write `bytes` to the store as this job's `format` output.
    pub async fn store_output(&self, bytes: Vec<u8>, format: FileFormat) -> Result<JobOutput> {
        let filename = self.output_filename(format);
        let size = bytes.len() as u64;
        let handle = self.store.write(bytes, &filename).await?;
        debug!(job_id = %self.job_id, %handle, size, "Output stored");
        Ok(JobOutput::Artifact(OutputArtifact {
            handle,
            filename,
            size,
            format,
        }))
    }

    /// `<input stem>.<ext>` for per-item operations, `<operation>.<ext>` for
    /// combining ones.
    pub fn output_filename(&self, format: FileFormat) -> String {
        let stem = match self.inputs.as_slice() {
            [single] if !self.operation.is_combining() => {
                let name = single.as_str().rsplit(['/', '\\']).next().unwrap_or_default();
                name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string()
            }
            _ => self.operation.as_str().to_string(),
        };
        let stem = if stem.is_empty() { "output".to_string() } else { stem };
        format!("{stem}.{}", format.extension())
    }

    /// Error for an operation routed to an adapter that does not handle it.
    pub fn not_handled(&self) -> WandelwerkError {
        WandelwerkError::UnsupportedOperation {
            from: self.source,
            to: self.target,
            operation: self.operation,
        }
    }
}

/// Uniform transformation contract implemented by every backend family.
#[async_trait]
pub trait TransformBackend: Send + Sync {
    fn id(&self) -> BackendId;

    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput>;
}

/// Run CPU-bound work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| WandelwerkError::BackendUnavailable(format!("worker task failed: {err}")))?
}

/// The installed adapters, keyed by backend family.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<BackendId, Arc<dyn TransformBackend>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reference adapter, configured from `config`.
    pub fn standard(config: &EngineConfig) -> Self {
        let mut set = Self::new();
        set.insert(Arc::new(OfficeBackend::from_config(config)));
        set.insert(Arc::new(RasterBackend::from_config(config)));
        set.insert(Arc::new(VectorBackend::from_config(config)));
        set.insert(Arc::new(PdfMergeBackend));
        set.insert(Arc::new(PdfEditBackend));
        set.insert(Arc::new(OcrBackend::from_config(config)));
        set.insert(Arc::new(ImageCleanupBackend::from_config(config)));
        set
    }

    /// Install `adapter`, replacing any adapter with the same id.
    pub fn insert(&mut self, adapter: Arc<dyn TransformBackend>) -> &mut Self {
        self.adapters.insert(adapter.id(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn TransformBackend>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, id: BackendId) -> Option<Arc<dyn TransformBackend>> {
        self.adapters.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.adapters.keys().copied().collect();
        ids.sort();
        f.debug_struct("AdapterSet").field("adapters", &ids).finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;

    #[test]
    fn output_names_follow_input_or_operation() {
        let store = Arc::new(MemoryArtifactStore::new());
        let single = testing::request(
            store.clone(),
            vec!["scans/holiday.photo.png".into()],
            OperationKind::Convert,
            FileFormat::Png,
            FileFormat::Jpeg,
            TransformOptions::default(),
        );
        assert_eq!(single.output_filename(FileFormat::Jpeg), "holiday.photo.jpg");

        let merged = testing::request(
            store,
            vec!["a.pdf".into(), "b.pdf".into()],
            OperationKind::Merge,
            FileFormat::Pdf,
            FileFormat::Pdf,
            TransformOptions::default(),
        );
        assert_eq!(merged.output_filename(FileFormat::Pdf), "merge.pdf");
    }

    #[tokio::test]
    async fn read_all_keeps_input_order() {
        let store = Arc::new(MemoryArtifactStore::new());
        let a = store.insert("a", vec![1]);
        let b = store.insert("b", vec![2]);
        let request = testing::request(
            store,
            vec![b, a],
            OperationKind::Merge,
            FileFormat::Pdf,
            FileFormat::Pdf,
            TransformOptions::default(),
        );
        assert_eq!(request.read_all().await.unwrap(), vec![vec![2], vec![1]]);
    }

    #[test]
    fn standard_set_covers_every_backend() {
        let set = AdapterSet::standard(&EngineConfig::default());
        for id in BackendId::ALL {
            assert!(set.get(id).is_some(), "{id} missing");
        }
        assert_eq!(set.len(), BackendId::ALL.len());
    }
}
