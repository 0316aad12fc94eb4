//! csm-storage 성능 벤치마크
//!
//! 실행: cargo bench -p csm-storage

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use csm_core::ports::metric_repository::MetricRepository;
use csm_storage::FileMetricRepository;
use std::hint::black_box;
use tempfile::TempDir;

fn create_temp_repository() -> (FileMetricRepository, TempDir) {
    let temp_dir = TempDir::new().expect("임시 디렉토리 생성 실패");
    let repo = FileMetricRepository::open(temp_dir.path().join("csm")).expect("저장소 생성 실패");
    (repo, temp_dir)
}

/// 새 레코드 생성 + 완료 처리 (입찰 하나의 수명)
fn bench_metric_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("metric_lifecycle");

    for count in [10u64, 100] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                create_temp_repository,
                |(repo, _dir)| {
                    for i in 0..count {
                        let id = format!("imp_{i}");
                        repo.update_by_id(&id, &|m| {
                            m.set_request_group_id("grp").set_cdb_call_start_elapsed(0);
                        });
                        repo.update_by_id(&id, &|m| {
                            m.set_cdb_call_end_elapsed(120).mark_ready_to_send();
                        });
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// 저장된 메트릭 전체 나열
fn bench_enumerate(c: &mut Criterion) {
    let (repo, _dir) = create_temp_repository();
    for i in 0..500 {
        repo.update_by_id(&format!("imp_{i}"), &|m| {
            m.mark_ready_to_send();
        });
    }

    c.bench_function("get_all_stored_metrics_500", |b| {
        b.iter(|| black_box(repo.get_all_stored_metrics()))
    });
    c.bench_function("total_size_500", |b| b.iter(|| black_box(repo.total_size())));
}

criterion_group!(benches, bench_metric_lifecycle, bench_enumerate);
criterion_main!(benches);
