//! 입찰 라이프사이클 리스너.
//!
//! CDB 호출/응답/소비 이벤트를 메트릭 저장소 변경으로 옮기고,
//! 메트릭이 닫히면 전송 워커를 깨운다. 모든 진입점은 CSM이 꺼져 있으면 무시된다.
//!
//! 저장소 에러는 저장소가 로깅 후 흡수하므로 여기서 광고 서빙 쪽으로
//! 전파되는 에러는 없다.

use csm_core::models::cdb::{Bid, CdbCallFailure, CdbRequest, CdbResponse};
use csm_core::ports::clock::Clock;
use csm_core::ports::metric_repository::MetricRepository;
use csm_network::SendTrigger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// CSM 입찰 라이프사이클 리스너
pub struct CsmBidLifecycleListener {
    repository: Arc<dyn MetricRepository>,
    clock: Arc<dyn Clock>,
    trigger: SendTrigger,
    enabled: AtomicBool,
}

impl CsmBidLifecycleListener {
    pub fn new(
        repository: Arc<dyn MetricRepository>,
        clock: Arc<dyn Clock>,
        trigger: SendTrigger,
        enabled: bool,
    ) -> Self {
        Self {
            repository,
            clock,
            trigger,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// 원격 킬 스위치
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// SDK 초기화 완료. 이전 프로세스가 남긴 메트릭을 보낸다
    pub fn on_sdk_initialized(&self) {
        if !self.is_enabled() {
            return;
        }
        self.trigger.trigger();
    }

    /// CDB 호출 시작
    pub fn on_cdb_call_started(&self, request: &CdbRequest) {
        if !self.is_enabled() {
            return;
        }

        let now = self.clock.current_time_millis();
        let request_group_id = request.id.as_str();
        for impression_id in request.impression_ids() {
            self.repository.update_by_id(impression_id, &|b| {
                b.set_request_group_id(request_group_id)
                    .set_cdb_call_start_elapsed(now);
            });
        }
    }

    /// CDB 응답 수신
    ///
    /// - 응답 슬롯 없음(no-fill): 종료 시점 기록 후 닫음
    /// - 유효하지 않은 슬롯: 종료 시점 없이 닫음
    /// - 유효한 입찰: 종료 시점, 캐시 사용, 존 ID 기록. 소비/만료 때 닫힘
    pub fn on_cdb_call_finished(&self, request: &CdbRequest, response: &CdbResponse) {
        if !self.is_enabled() {
            return;
        }

        let now = self.clock.current_time_millis();
        let mut closed = 0;

        for impression_id in request.impression_ids() {
            match response.slot_by_impression_id(impression_id) {
                None => {
                    self.repository.update_by_id(impression_id, &|b| {
                        b.set_cdb_call_end_elapsed(now).mark_ready_to_send();
                    });
                    closed += 1;
                }
                Some(slot) if !slot.is_valid() => {
                    self.repository.update_by_id(impression_id, &|b| {
                        b.mark_ready_to_send();
                    });
                    closed += 1;
                }
                Some(slot) => {
                    let zone_id = slot.zone_id.as_deref();
                    self.repository.update_by_id(impression_id, &|b| {
                        b.set_cdb_call_end_elapsed(now).mark_cached_bid_used();
                        if let Some(zone_id) = zone_id {
                            b.set_zone_id(zone_id);
                        }
                    });
                }
            }
        }

        if closed > 0 {
            debug!("CDB 응답으로 메트릭 {closed}개 닫힘");
            self.trigger.trigger();
        }
    }

    /// CDB 호출 실패 (타임아웃 또는 네트워크 에러)
    pub fn on_cdb_call_failed(&self, request: &CdbRequest, failure: &CdbCallFailure) {
        if !self.is_enabled() {
            return;
        }

        let is_timeout = failure.is_timeout();
        for impression_id in request.impression_ids() {
            self.repository.update_by_id(impression_id, &|b| {
                if is_timeout {
                    b.mark_timeout();
                }
                b.mark_ready_to_send();
            });
        }
        debug!("CDB 호출 실패로 메트릭 닫힘: {failure:?}");
        self.trigger.trigger();
    }

    /// 캐시된 입찰 소비. 만료된 입찰이면 소비 시간은 기록하지 않는다
    pub fn on_bid_consumed(&self, bid: &Bid) {
        if !self.is_enabled() {
            return;
        }

        let now = self.clock.current_time_millis();
        let expired = bid.is_expired(now);
        self.repository.update_by_id(&bid.impression_id, &|b| {
            // 종료 시점 기록이 유실됐으면 소비 시간만 빠지고 메트릭은 닫힌다
            if !expired && b.cdb_call_end_elapsed().is_some() {
                if let Some(start) = b.cdb_call_start_elapsed() {
                    b.set_elapsed(now.saturating_sub(start));
                }
            }
            b.mark_ready_to_send();
        });
        self.trigger.trigger();
    }

    /// 캐시된 입찰이 소비되지 않고 만료되거나 제거됨
    pub fn on_bid_expired(&self, bid: &Bid) {
        if !self.is_enabled() {
            return;
        }

        self.repository.update_by_id(&bid.impression_id, &|b| {
            b.mark_ready_to_send();
        });
        debug!("소비되지 않은 입찰 만료로 메트릭 닫힘: {}", bid.impression_id);
        self.trigger.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csm_core::models::cdb::{CdbRequestSlot, CdbResponseSlot};
    use csm_core::models::metric::{Metric, MetricBuilder};
    use csm_core::ports::metric_repository::{MetricMover, MetricUpdater};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU64;

    #[derive(Default)]
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::Relaxed);
        }
    }

    impl Clock for ManualClock {
        fn current_time_millis(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[derive(Default)]
    struct MemoryRepository {
        metrics: Mutex<BTreeMap<String, Metric>>,
    }

    impl MetricRepository for MemoryRepository {
        fn update_by_id(&self, impression_id: &str, updater: MetricUpdater<'_>) {
            let mut metrics = self.metrics.lock();
            let mut builder = metrics
                .get(impression_id)
                .cloned()
                .map(MetricBuilder::from)
                .unwrap_or_else(|| MetricBuilder::new(impression_id));
            updater(&mut builder);
            let metric = builder.build().unwrap();
            metrics.insert(impression_id.to_string(), metric);
        }

        fn move_by_id(&self, _impression_id: &str, _mover: MetricMover<'_>) {}

        fn get_all_stored_metrics(&self) -> Vec<Metric> {
            self.metrics.lock().values().cloned().collect()
        }

        fn total_size(&self) -> u64 {
            0
        }

        fn contains(&self, impression_id: &str) -> bool {
            self.metrics.lock().contains_key(impression_id)
        }
    }

    impl MemoryRepository {
        fn get(&self, impression_id: &str) -> Metric {
            self.metrics.lock()[impression_id].clone()
        }
    }

    fn setup(enabled: bool) -> (Arc<MemoryRepository>, Arc<ManualClock>, CsmBidLifecycleListener) {
        let repo = Arc::new(MemoryRepository::default());
        let clock = Arc::new(ManualClock::default());
        let listener =
            CsmBidLifecycleListener::new(repo.clone(), clock.clone(), SendTrigger::new(), enabled);
        (repo, clock, listener)
    }

    fn request_with(ids: &[&str]) -> CdbRequest {
        let mut request = CdbRequest::new(
            235,
            ids.iter().map(|_| CdbRequestSlot::new("placement")).collect(),
        );
        for (slot, id) in request.slots.iter_mut().zip(ids) {
            slot.impression_id = id.to_string();
        }
        request
    }

    fn valid_slot(id: &str, ttl: u64) -> CdbResponseSlot {
        CdbResponseSlot {
            impression_id: id.to_string(),
            zone_id: Some("42".to_string()),
            cpm: "1.50".to_string(),
            display_url: "https://ads.example.com/creative.js".to_string(),
            ttl,
        }
    }

    #[test]
    fn call_started_sets_group_and_start() {
        let (repo, clock, listener) = setup(true);
        clock.set(30);
        let request = request_with(&["a", "b"]);

        listener.on_cdb_call_started(&request);

        for id in ["a", "b"] {
            let metric = repo.get(id);
            assert_eq!(metric.request_group_id(), Some(request.id.as_str()));
            assert_eq!(metric.cdb_call_start_elapsed(), Some(30));
            assert!(!metric.is_ready_to_send());
        }
    }

    #[test]
    fn no_fill_closes_without_bid() {
        let (repo, clock, listener) = setup(true);
        let request = request_with(&["a"]);
        listener.on_cdb_call_started(&request);
        clock.set(80);

        listener.on_cdb_call_finished(&request, &CdbResponse::default());

        let metric = repo.get("a");
        assert!(metric.is_ready_to_send());
        assert_eq!(metric.cdb_call_end_elapsed(), Some(80));
        assert!(!metric.is_cached_bid_used());
        assert!(metric.zone_id().is_none());
        assert!(metric.elapsed().is_none());
    }

    #[test]
    fn invalid_slot_closes_without_end() {
        let (repo, _clock, listener) = setup(true);
        let request = request_with(&["a"]);
        listener.on_cdb_call_started(&request);

        let mut slot = valid_slot("a", 60);
        slot.cpm = "-1".to_string();
        listener.on_cdb_call_finished(&request, &CdbResponse { slots: vec![slot] });

        let metric = repo.get("a");
        assert!(metric.is_ready_to_send());
        assert!(metric.cdb_call_end_elapsed().is_none());
        assert!(!metric.is_cached_bid_used());
    }

    #[test]
    fn valid_bid_stays_open_until_consumed() {
        let (repo, clock, listener) = setup(true);
        let request = request_with(&["a"]);
        listener.on_cdb_call_started(&request);
        clock.set(120);
        listener.on_cdb_call_finished(
            &request,
            &CdbResponse {
                slots: vec![valid_slot("a", 60)],
            },
        );

        let metric = repo.get("a");
        assert!(!metric.is_ready_to_send());
        assert!(metric.is_cached_bid_used());
        assert_eq!(metric.zone_id(), Some("42"));

        clock.set(450);
        listener.on_bid_consumed(&Bid::from_slot(&valid_slot("a", 60), 120));

        let metric = repo.get("a");
        assert!(metric.is_ready_to_send());
        assert_eq!(metric.elapsed(), Some(450));
        assert_eq!(metric.cdb_call_end_elapsed(), Some(120));
    }

    #[test]
    fn expired_bid_has_no_elapsed() {
        let (repo, clock, listener) = setup(true);
        let request = request_with(&["a"]);
        listener.on_cdb_call_started(&request);
        clock.set(10);
        listener.on_cdb_call_finished(
            &request,
            &CdbResponse {
                slots: vec![valid_slot("a", 1)],
            },
        );

        // 시계가 크게 점프하면 만료
        clock.set(u64::MAX / 2);
        listener.on_bid_consumed(&Bid::from_slot(&valid_slot("a", 1), 10));

        let metric = repo.get("a");
        assert!(metric.is_ready_to_send());
        assert!(metric.is_cached_bid_used());
        assert!(metric.elapsed().is_none());
    }

    #[test]
    fn unconsumed_bid_closes_on_expiry() {
        let (repo, clock, listener) = setup(true);
        let request = request_with(&["a"]);
        listener.on_cdb_call_started(&request);
        clock.set(40);
        listener.on_cdb_call_finished(
            &request,
            &CdbResponse {
                slots: vec![valid_slot("a", 60)],
            },
        );
        assert!(!repo.get("a").is_ready_to_send());

        clock.set(70_000);
        listener.on_bid_expired(&Bid::from_slot(&valid_slot("a", 60), 40));

        let metric = repo.get("a");
        assert!(metric.is_ready_to_send());
        assert!(metric.is_cached_bid_used());
        assert_eq!(metric.zone_id(), Some("42"));
        assert_eq!(metric.cdb_call_end_elapsed(), Some(40));
        assert!(metric.elapsed().is_none());
    }

    #[test]
    fn consume_after_lost_finish_still_closes() {
        let (repo, clock, listener) = setup(true);
        let request = request_with(&["a"]);
        listener.on_cdb_call_started(&request);

        // 응답 기록 없이 바로 소비
        clock.set(450);
        listener.on_bid_consumed(&Bid::from_slot(&valid_slot("a", 60), 0));

        let metric = repo.get("a");
        assert!(metric.is_ready_to_send());
        assert_eq!(metric.cdb_call_start_elapsed(), Some(0));
        assert!(metric.cdb_call_end_elapsed().is_none());
        assert!(metric.elapsed().is_none());
    }

    #[test]
    fn timeout_and_network_error() {
        let (repo, _clock, listener) = setup(true);
        let timed_out = request_with(&["t"]);
        let failed = request_with(&["n"]);
        listener.on_cdb_call_started(&timed_out);
        listener.on_cdb_call_started(&failed);

        listener.on_cdb_call_failed(&timed_out, &CdbCallFailure::Timeout);
        listener.on_cdb_call_failed(&failed, &CdbCallFailure::Network("reset".to_string()));

        let t = repo.get("t");
        assert!(t.is_ready_to_send());
        assert!(t.is_timeout());
        assert!(t.cdb_call_end_elapsed().is_none());

        let n = repo.get("n");
        assert!(n.is_ready_to_send());
        assert!(!n.is_timeout());
        assert!(n.cdb_call_end_elapsed().is_none());
    }

    #[test]
    fn disabled_listener_does_nothing() {
        let (repo, _clock, listener) = setup(false);
        let request = request_with(&["a"]);

        listener.on_sdk_initialized();
        listener.on_cdb_call_started(&request);
        listener.on_cdb_call_failed(&request, &CdbCallFailure::Timeout);
        listener.on_bid_expired(&Bid::from_slot(&valid_slot("a", 60), 0));
        assert!(repo.get_all_stored_metrics().is_empty());

        listener.set_enabled(true);
        listener.on_cdb_call_started(&request);
        assert!(repo.contains("a"));
    }
}
