//! 파일 기반 메트릭 저장소.
//!
//! 노출 ID마다 저장 단위를 최대 하나만 만든다. 생성은 `DashMap` 엔트리 단위
//! get-or-create로 원자적이라, 동시에 같은 새 ID를 요청해도 단위는 하나다.
//! 레코드가 없어진 단위는 다른 참조가 없을 때만 같은 엔트리 락 아래에서 맵에서 뺀다.

use csm_core::error::CoreError;
use csm_core::models::metric::Metric;
use csm_core::ports::metric_repository::{MetricMover, MetricRepository, MetricUpdater};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metric_directory::MetricDirectory;
use crate::metric_storage_unit::MetricStorageUnit;

/// 디렉토리 하나를 백엔드로 쓰는 메트릭 저장소
pub struct FileMetricRepository {
    directory: MetricDirectory,
    units: DashMap<PathBuf, Arc<MetricStorageUnit>>,
}

impl FileMetricRepository {
    /// 디렉토리를 열고 저장소 생성
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        Ok(Self::new(MetricDirectory::open(dir)?))
    }

    pub fn new(directory: MetricDirectory) -> Self {
        Self {
            directory,
            units: DashMap::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        self.directory.path()
    }

    /// 지금까지 만들어진 저장 단위 수
    pub fn storage_unit_count(&self) -> usize {
        self.units.len()
    }

    fn unit_for_id(&self, impression_id: &str) -> Arc<MetricStorageUnit> {
        let path = self.directory.metric_file_path(impression_id);
        self.unit_for_path(path, impression_id)
    }

    fn unit_for_path(&self, path: PathBuf, impression_id: &str) -> Arc<MetricStorageUnit> {
        // 엔트리 락을 잡은 동안에만 생성되므로 같은 경로에 두 단위가 생기지 않는다
        let unit_path = path.clone();
        self.units
            .entry(path)
            .or_insert_with(|| Arc::new(MetricStorageUnit::new(impression_id, unit_path)))
            .value()
            .clone()
    }

    /// 레코드가 없고 다른 곳에서 쓰고 있지 않은 단위를 맵에서 제거
    ///
    /// 단위는 맵을 통해서만 나눠주므로, 샤드 락을 잡은 상태에서 참조가
    /// 맵과 호출자 둘뿐이면 이 단위를 쓰는 쪽은 더 없다.
    fn release_unit(&self, unit: Arc<MetricStorageUnit>) {
        let evicted = self
            .units
            .remove_if(unit.path(), |_, held| {
                Arc::strong_count(held) == 2 && !held.path().exists()
            })
            .is_some();
        if evicted {
            debug!("저장 단위 해제: {}", unit.impression_id());
        }
    }
}

impl MetricRepository for FileMetricRepository {
    fn update_by_id(&self, impression_id: &str, updater: MetricUpdater<'_>) {
        let unit = self.unit_for_id(impression_id);
        if let Err(e) = unit.update(updater) {
            warn!("메트릭 업데이트 실패 ({impression_id}): {e}");
            self.release_unit(unit);
        }
    }

    fn move_by_id(&self, impression_id: &str, mover: MetricMover<'_>) {
        let unit = self.unit_for_id(impression_id);
        match unit.move_with(mover) {
            Ok(true) => debug!("메트릭 이동 완료: {impression_id}"),
            Ok(false) => {}
            Err(e) => warn!("메트릭 이동 실패 ({impression_id}): {e}"),
        }
        self.release_unit(unit);
    }

    fn get_all_stored_metrics(&self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for path in self.directory.list_files() {
            let Some(impression_id) = MetricDirectory::impression_id_of(&path) else {
                continue;
            };
            let unit = self.unit_for_path(path, &impression_id);
            match unit.read() {
                Ok(metric) => metrics.push(metric),
                // 나열 이후 삭제됐거나 손상된 레코드는 건너뛴다
                Err(e) => debug!("저장된 메트릭 읽기 건너뜀: {e}"),
            }
        }
        metrics
    }

    fn total_size(&self) -> u64 {
        self.directory
            .list_files()
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }

    fn contains(&self, impression_id: &str) -> bool {
        self.directory.metric_file_path(impression_id).is_file()
    }
}
