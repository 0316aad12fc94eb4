//! 메트릭 저장소 포트.
//!
//! 구현: `csm-storage` crate (파일 기반 `FileMetricRepository`)

use crate::models::metric::{Metric, MetricBuilder};

/// 메트릭 변경 함수. 경합 시 여러 번 적용될 수 있으므로 멱등해야 한다.
pub type MetricUpdater<'a> = &'a dyn Fn(&mut MetricBuilder);

/// 메트릭 이동 함수. `true`를 반환하면 메트릭이 목적지로 넘어간 것으로 보고
/// 저장소의 레코드를 삭제한다.
pub type MetricMover<'a> = &'a dyn Fn(&Metric) -> bool;

/// 노출 ID별 메트릭 저장소
///
/// 저장소 에러는 구현체 내부에서 로깅 후 흡수한다. 메트릭 수집이
/// 광고 서빙을 방해해서는 안 되므로 어떤 메서드도 에러를 반환하지 않는다.
pub trait MetricRepository: Send + Sync {
    /// 노출 ID의 메트릭을 원자적으로 변경 (없으면 빈 메트릭에서 시작)
    fn update_by_id(&self, impression_id: &str, updater: MetricUpdater<'_>);

    /// 노출 ID의 메트릭을 원자적으로 이동 (상태 전이)
    fn move_by_id(&self, impression_id: &str, mover: MetricMover<'_>);

    /// 저장된 모든 메트릭 (개별 메트릭은 원자적으로 읽지만 전체는 스냅샷이 아님)
    ///
    /// 읽을 수 없는 레코드는 건너뛴다.
    fn get_all_stored_metrics(&self) -> Vec<Metric>;

    /// 저장된 레코드의 총 크기 (바이트)
    fn total_size(&self) -> u64;

    /// 노출 ID의 레코드가 저장되어 있는지
    fn contains(&self, impression_id: &str) -> bool;
}
