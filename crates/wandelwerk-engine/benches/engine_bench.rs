// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for capability resolution and the dispatch path
// (tracker transitions plus adapter hand-off) with a no-op backend.

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use wandelwerk_core::error::Result;
use wandelwerk_core::types::{ConversionJob, FileFormat, JobOutput, OperationKind};
use wandelwerk_engine::{
    AdapterSet, BackendId, BatchExecutor, CapabilityRegistry, Dispatcher, JobTracker,
    MemoryArtifactStore, TransformBackend, TransformRequest,
};

struct NoopBackend;

#[async_trait]
impl TransformBackend for NoopBackend {
    fn id(&self) -> BackendId {
        BackendId::Raster
    }

    async fn transform(&self, request: &TransformRequest) -> Result<JobOutput> {
        request.store_output(b"x".to_vec(), request.target).await
    }
}

fn dispatcher(store: Arc<MemoryArtifactStore>) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        Arc::new(CapabilityRegistry::standard()),
        AdapterSet::new().with(Arc::new(NoopBackend)),
        Arc::new(JobTracker::new()),
        store,
    ))
}

fn bench_resolve(c: &mut Criterion) {
    let registry = CapabilityRegistry::standard();
    c.bench_function("resolve (supported)", |b| {
        b.iter(|| {
            black_box(registry.resolve(
                black_box(FileFormat::Docx),
                black_box(FileFormat::Pdf),
                OperationKind::Convert,
            ))
        });
    });
    c.bench_function("resolve_str (unknown format)", |b| {
        b.iter(|| black_box(registry.resolve_str(black_box("xyz"), "pdf", "convert")));
    });
    c.bench_function("supported_targets (png)", |b| {
        b.iter(|| black_box(registry.supported_targets(black_box(FileFormat::Png))));
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let store = Arc::new(MemoryArtifactStore::new());
    let input = store.insert("photo.png", b"png".to_vec());
    let dispatcher = dispatcher(store);

    c.bench_function("dispatcher execute (noop backend)", |b| {
        b.iter(|| {
            let job = ConversionJob::single(
                FileFormat::Png,
                FileFormat::Jpeg,
                OperationKind::Convert,
                input.clone(),
            );
            let out = runtime.block_on(dispatcher.execute(job));
            assert!(out.is_ok());
        });
    });

    let mut group = c.benchmark_group("batch of 32");
    for concurrency in [1usize, 4, 16] {
        let executor = BatchExecutor::new(dispatcher.clone(), concurrency);
        group.bench_with_input(BenchmarkId::from_parameter(concurrency), &concurrency, |b, _| {
            b.iter(|| {
                let jobs: Vec<ConversionJob> = (0..32)
                    .map(|_| {
                        ConversionJob::single(
                            FileFormat::Png,
                            FileFormat::Jpeg,
                            OperationKind::Convert,
                            input.clone(),
                        )
                    })
                    .collect();
                let result = runtime.block_on(executor.execute_batch(jobs));
                assert!(result.is_ok_and(|r| r.all_succeeded()));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_dispatch);
criterion_main!(benches);
