//! 통합 테스트 공용 헬퍼.

#![allow(dead_code)]

use async_trait::async_trait;
use csm_core::error::CoreError;
use csm_core::models::cdb::{CdbRequest, CdbRequestSlot, CdbResponseSlot};
use csm_core::models::metric_request::MetricRequest;
use csm_core::ports::api_client::CsmApiClient;
use csm_core::ports::clock::Clock;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// 테스트가 직접 움직이는 시계
#[derive(Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn current_time_millis(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// 요청을 기록하고 처음 `fail_until`번은 실패하는 클라이언트
pub struct RecordingApiClient {
    call_count: AtomicU32,
    fail_until: u32,
    requests: Mutex<Vec<(MetricRequest, bool)>>,
}

impl RecordingApiClient {
    pub fn new() -> Self {
        Self::failing(0)
    }

    pub fn failing(fail_until: u32) -> Self {
        Self {
            call_count: AtomicU32::new(0),
            fail_until,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().len()
    }

    /// 성공한 요청만
    pub fn delivered(&self) -> Vec<MetricRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// 성공한 요청에 담긴 노출 ID 전체
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .flat_map(|request| {
                request
                    .impression_ids()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl CsmApiClient for RecordingApiClient {
    async fn post_csm(&self, request: &MetricRequest) -> Result<(), CoreError> {
        let count = self.call_count.fetch_add(1, Ordering::Relaxed) + 1;
        let ok = count > self.fail_until;
        self.requests.lock().push((request.clone(), ok));
        if ok {
            Ok(())
        } else {
            Err(CoreError::Network("connection reset".to_string()))
        }
    }
}

/// 노출 ID를 고정한 CDB 요청
pub fn request_with(ids: &[&str]) -> CdbRequest {
    let slots = ids
        .iter()
        .map(|id| CdbRequestSlot {
            impression_id: id.to_string(),
            placement_id: format!("placement_{id}"),
        })
        .collect();
    CdbRequest::new(235, slots)
}

/// 유효한 입찰 슬롯
pub fn bid_slot(id: &str, zone_id: &str, ttl: u64) -> CdbResponseSlot {
    CdbResponseSlot {
        impression_id: id.to_string(),
        zone_id: Some(zone_id.to_string()),
        cpm: "1.20".to_string(),
        display_url: "https://ads.example.com/creative.js".to_string(),
        ttl,
    }
}
