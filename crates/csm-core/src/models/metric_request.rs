//! CSM 전송 요청 모델.
//!
//! 배치 헤더(프로필 ID, SDK 버전)와 노출별 피드백 목록으로 구성된다.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::metric::Metric;

/// CSM 배치 요청 (`POST /csm` 본문)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRequest {
    /// 노출별 피드백 목록
    pub feedbacks: Vec<MetricRequestFeedback>,
    /// SDK 버전
    #[serde(rename = "wrapper_version")]
    pub wrapper_version: String,
    /// 연동 프로필 ID
    #[serde(rename = "profile_id")]
    pub profile_id: u32,
}

impl MetricRequest {
    /// 메트릭 목록으로 요청 생성
    ///
    /// 같은 노출 ID가 여러 번 들어오면 첫 번째만 남긴다.
    /// 피드백 순서는 입력 순서를 따른다.
    pub fn from_metrics<'a>(
        metrics: impl IntoIterator<Item = &'a Metric>,
        wrapper_version: impl Into<String>,
        profile_id: u32,
    ) -> Self {
        let mut seen = HashSet::new();
        let feedbacks = metrics
            .into_iter()
            .filter(|metric| seen.insert(metric.impression_id().to_string()))
            .map(MetricRequestFeedback::from)
            .collect();

        Self {
            feedbacks,
            wrapper_version: wrapper_version.into(),
            profile_id,
        }
    }

    /// 요청에 포함된 노출 ID 목록
    pub fn impression_ids(&self) -> Vec<&str> {
        self.feedbacks
            .iter()
            .flat_map(|feedback| feedback.slots.iter())
            .map(|slot| slot.impression_id.as_str())
            .collect()
    }
}

/// 노출 하나에 대한 피드백
///
/// 호출 시점은 호출 시작 기준 상대값으로 보낸다 (`cdbCallStartElapsed`는 항상 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequestFeedback {
    pub slots: Vec<MetricRequestSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<u64>,
    pub is_timeout: bool,
    pub cdb_call_start_elapsed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdb_call_end_elapsed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_group_id: Option<String>,
}

impl From<&Metric> for MetricRequestFeedback {
    fn from(metric: &Metric) -> Self {
        let start = metric.cdb_call_start_elapsed().unwrap_or(0);
        let cdb_call_end_elapsed = metric
            .cdb_call_end_elapsed()
            .map(|end| end.saturating_sub(start));

        Self {
            slots: vec![MetricRequestSlot {
                impression_id: metric.impression_id().to_string(),
                zone_id: metric.zone_id().map(str::to_string),
                cached_bid_used: metric.is_cached_bid_used(),
            }],
            elapsed: metric.elapsed(),
            is_timeout: metric.is_timeout(),
            cdb_call_start_elapsed: 0,
            cdb_call_end_elapsed,
            request_group_id: metric.request_group_id().map(str::to_string),
        }
    }
}

/// 피드백의 슬롯 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequestSlot {
    pub impression_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    pub cached_bid_used: bool,
}
