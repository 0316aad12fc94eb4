//! 메트릭 저장 단위.
//!
//! 레코드 파일 하나를 감싸는 단일 작성자 래퍼. 같은 단위에 대한 읽기/변경/이동은
//! 상호 배제되며, 다른 단위끼리는 서로 막지 않는다.
//!
//! 쓰기는 임시 파일에 기록 → fsync → rename 순서로 수행한다. 중간에 프로세스가
//! 죽으면 기존 레코드가 그대로 남는다 (업데이트 유실, 손상 없음).

use csm_core::error::CoreError;
use csm_core::models::metric::{Metric, MetricBuilder};
use csm_core::ports::metric_repository::{MetricMover, MetricUpdater};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::metric_directory::temp_path_for;

/// 레코드 하나에 대한 원자적 저장 단위
#[derive(Debug)]
pub struct MetricStorageUnit {
    impression_id: String,
    path: PathBuf,
    /// 단일 작성자 구간
    lock: Mutex<()>,
}

impl MetricStorageUnit {
    pub fn new(impression_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            impression_id: impression_id.into(),
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn impression_id(&self) -> &str {
        &self.impression_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 저장된 스냅샷
    ///
    /// 레코드가 없거나 손상되었으면 `StorageRead` 에러.
    pub fn read(&self) -> Result<Metric, CoreError> {
        let _guard = self.lock.lock();
        self.read_locked()?
            .ok_or_else(|| self.read_error("레코드 없음".to_string()))
    }

    /// 저장된 스냅샷(없으면 빈 메트릭)에 변경 함수를 적용하고 원자적으로 저장
    ///
    /// 기존 레코드가 손상되었으면 빈 메트릭에서 다시 시작한다.
    /// 변경 결과가 일관성 검증에 실패하면 기존 레코드를 유지하고 `Validation` 에러.
    pub fn update(&self, updater: MetricUpdater<'_>) -> Result<Metric, CoreError> {
        let _guard = self.lock.lock();

        let mut builder = match self.read_locked() {
            Ok(Some(metric)) => MetricBuilder::from(metric),
            Ok(None) => MetricBuilder::new(self.impression_id.clone()),
            Err(e) => {
                warn!("손상된 메트릭 레코드를 버리고 새로 시작: {e}");
                MetricBuilder::new(self.impression_id.clone())
            }
        };

        updater(&mut builder);
        let metric = builder.build()?;
        self.write_locked(&metric)?;
        Ok(metric)
    }

    /// 저장된 메트릭을 목적지로 넘기고, 받아들여지면 레코드를 삭제한다
    ///
    /// 레코드가 없으면 `mover`를 호출하지 않고 `Ok(false)`.
    pub fn move_with(&self, mover: MetricMover<'_>) -> Result<bool, CoreError> {
        let _guard = self.lock.lock();

        let Some(metric) = self.read_locked()? else {
            return Ok(false);
        };

        if !mover(&metric) {
            return Ok(false);
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("메트릭 레코드 이동 완료: {}", self.impression_id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(self.write_error(format!("레코드 삭제 실패: {e}"))),
        }
    }

    /// 레코드 파일 크기 (없으면 0)
    pub fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn read_locked(&self) -> Result<Option<Metric>, CoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.read_error(format!("파일 읽기 실패: {e}"))),
        };

        let metric: Metric = serde_json::from_slice(&bytes)
            .map_err(|e| self.read_error(format!("레코드 파싱 실패: {e}")))?;

        if metric.impression_id() != self.impression_id {
            return Err(self.read_error(format!(
                "레코드의 노출 ID 불일치: {}",
                metric.impression_id()
            )));
        }

        Ok(Some(metric))
    }

    fn write_locked(&self, metric: &Metric) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(metric)
            .map_err(|e| self.write_error(format!("직렬화 실패: {e}")))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.write_error(format!("디렉토리 생성 실패: {e}")))?;
        }

        let temp_path = temp_path_for(&self.path);
        let result = write_and_sync(&temp_path, &bytes)
            .and_then(|()| fs::rename(&temp_path, &self.path));

        if let Err(e) = result {
            // 임시 파일만 정리. 기존 레코드는 건드리지 않는다
            let _ = fs::remove_file(&temp_path);
            return Err(self.write_error(format!("원자적 쓰기 실패: {e}")));
        }
        Ok(())
    }

    fn read_error(&self, message: String) -> CoreError {
        CoreError::StorageRead {
            impression_id: self.impression_id.clone(),
            message,
        }
    }

    fn write_error(&self, message: String) -> CoreError {
        CoreError::StorageWrite {
            impression_id: self.impression_id.clone(),
            message,
        }
    }
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
