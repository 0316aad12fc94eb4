//! 메트릭 전송 파이프라인.
//!
//! 저장소에서 전송 준비된 메트릭을 골라 배치로 보내고 결과를 반영한다.
//! - 성공: 배치에 포함된 레코드 삭제
//! - 실패: 레코드를 그대로 두어 다음 전송에 다시 포함
//!
//! 전송 중인 노출 ID는 클레임 집합에 올려 겹치는 전송이 같은 메트릭을
//! 두 번 보내지 않게 한다. 클레임은 전송이 끝나거나 취소되면 풀린다.

use chrono::{DateTime, Utc};
use csm_core::error::CoreError;
use csm_core::models::metric::Metric;
use csm_core::models::metric_request::MetricRequest;
use csm_core::ports::api_client::CsmApiClient;
use csm_core::ports::metric_repository::MetricRepository;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 메트릭 전송 파이프라인
pub struct MetricSendingPipeline {
    repository: Arc<dyn MetricRepository>,
    api_client: Arc<dyn CsmApiClient>,
    profile_id: u32,
    sdk_version: String,
    max_batch_size: usize,
    /// 전송 중인 노출 ID
    in_flight: Arc<Mutex<HashSet<String>>>,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    metrics_sent: AtomicU64,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
}

impl MetricSendingPipeline {
    /// 새 전송 파이프라인 생성
    pub fn new(
        repository: Arc<dyn MetricRepository>,
        api_client: Arc<dyn CsmApiClient>,
        profile_id: u32,
        sdk_version: impl Into<String>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            repository,
            api_client,
            profile_id,
            sdk_version: sdk_version.into(),
            max_batch_size: max_batch_size.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            batches_sent: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            metrics_sent: AtomicU64::new(0),
            last_success_at: Mutex::new(None),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// 준비된 메트릭을 배치 하나로 전송
    ///
    /// 보낸 메트릭 수를 반환한다. 보낼 것이 없으면 전송 없이 `Ok(0)`.
    /// 실패 시 레코드는 저장소에 남고 에러를 반환한다.
    pub async fn send_pending(&self) -> Result<usize, CoreError> {
        let repository = Arc::clone(&self.repository);
        let in_flight = Arc::clone(&self.in_flight);
        let max_batch_size = self.max_batch_size;
        let claim = tokio::task::spawn_blocking(move || {
            select_batch(repository.as_ref(), &in_flight, max_batch_size)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("메트릭 선택 태스크 실패: {e}")))?;

        let Some(claim) = claim else {
            return Ok(0);
        };

        let request =
            MetricRequest::from_metrics(&claim.metrics, self.sdk_version.clone(), self.profile_id);
        let count = request.feedbacks.len();

        match self.api_client.post_csm(&request).await {
            Ok(()) => {
                self.remove_sent(claim.impression_ids()).await?;
                self.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.metrics_sent.fetch_add(count as u64, Ordering::Relaxed);
                *self.last_success_at.lock() = Some(Utc::now());
                debug!("CSM 배치 전송 성공: {count}개 메트릭");
                Ok(count)
            }
            Err(e) => {
                self.batches_failed.fetch_add(1, Ordering::Relaxed);
                // 레코드는 건드리지 않는다. 클레임만 풀려 다음 전송에 다시 포함
                warn!("CSM 배치 전송 실패, {count}개 메트릭 재전송 대기: {e}");
                Err(e)
            }
        }
    }

    /// 준비된 메트릭이 남지 않을 때까지 배치를 반복 전송
    ///
    /// 실패하면 거기서 멈춘다. 지금까지 보낸 메트릭 수를 반환한다.
    pub async fn send_all_pending(&self) -> Result<usize, CoreError> {
        let mut total = 0;
        loop {
            let sent = self.send_pending().await?;
            total += sent;
            if sent < self.max_batch_size {
                return Ok(total);
            }
        }
    }

    /// 파이프라인 통계
    pub fn stats(&self) -> PipelineStats {
        let pending_ready = self
            .repository
            .get_all_stored_metrics()
            .iter()
            .filter(|m| m.is_ready_to_send())
            .count();

        PipelineStats {
            pending_ready,
            stored_bytes: self.repository.total_size(),
            in_flight: self.in_flight.lock().len(),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            metrics_sent: self.metrics_sent.load(Ordering::Relaxed),
            last_success_at: *self.last_success_at.lock(),
        }
    }

    async fn remove_sent(&self, impression_ids: Vec<String>) -> Result<(), CoreError> {
        let repository = Arc::clone(&self.repository);
        tokio::task::spawn_blocking(move || {
            for impression_id in &impression_ids {
                repository.move_by_id(impression_id, &|_| true);
            }
        })
        .await
        .map_err(|e| {
            error!("전송된 메트릭 삭제 실패: {e}");
            CoreError::Internal(format!("메트릭 삭제 태스크 실패: {e}"))
        })
    }
}

/// 전송 준비되었고 아직 클레임되지 않은 메트릭을 최대 배치 크기만큼 클레임
///
/// 나열은 시점 스냅샷이 아니므로, 클레임한 뒤에도 레코드가 남아 있는지 다시
/// 확인한다. 레코드 삭제는 클레임을 가진 쪽만 하므로 이 확인 이후에는 사라지지 않는다.
fn select_batch(
    repository: &dyn MetricRepository,
    in_flight: &Arc<Mutex<HashSet<String>>>,
    max_batch_size: usize,
) -> Option<BatchClaim> {
    let candidates: Vec<Metric> = repository
        .get_all_stored_metrics()
        .into_iter()
        .filter(Metric::is_ready_to_send)
        .collect();

    let mut claim = BatchClaim {
        metrics: Vec::new(),
        in_flight: Arc::clone(in_flight),
    };
    {
        let mut claimed = in_flight.lock();
        for metric in candidates {
            if claim.metrics.len() >= max_batch_size {
                break;
            }
            if claimed.insert(metric.impression_id().to_string()) {
                claim.metrics.push(metric);
            }
        }
    }

    let (live, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut claim.metrics)
        .into_iter()
        .partition(|metric| repository.contains(metric.impression_id()));
    if !gone.is_empty() {
        let mut claimed = in_flight.lock();
        for metric in &gone {
            claimed.remove(metric.impression_id());
        }
    }
    claim.metrics = live;

    if claim.metrics.is_empty() {
        None
    } else {
        Some(claim)
    }
}

/// 전송 중인 배치의 클레임. 드롭되면 노출 ID를 클레임 집합에서 뺀다
struct BatchClaim {
    metrics: Vec<Metric>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl BatchClaim {
    fn impression_ids(&self) -> Vec<String> {
        self.metrics
            .iter()
            .map(|m| m.impression_id().to_string())
            .collect()
    }
}

impl Drop for BatchClaim {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        for metric in &self.metrics {
            in_flight.remove(metric.impression_id());
        }
    }
}

/// 전송 파이프라인 통계
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// 저장소에서 전송 대기 중인 메트릭 수
    pub pending_ready: usize,
    /// 저장된 레코드 총 바이트
    pub stored_bytes: u64,
    /// 전송 중인 메트릭 수
    pub in_flight: usize,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub metrics_sent: u64,
    /// 마지막 전송 성공 시각
    pub last_success_at: Option<DateTime<Utc>>,
}
