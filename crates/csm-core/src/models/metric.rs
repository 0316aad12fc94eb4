//! CSM 메트릭 모델.
//!
//! 입찰 요청 하나(노출 ID 하나)의 라이프사이클을 기술하는 불변 값 객체.
//! 생성은 [`MetricBuilder`]로만 가능하며, `build()`에서 내부 일관성을 검증한다.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 노출 하나에 대한 입찰 라이프사이클 메트릭 (불변 스냅샷)
///
/// 직렬화 형식은 저장소 레코드 형식과 같다. 역직렬화는 [`MetricBuilder`]를
/// 거치므로 내부 불일치 레코드는 읽기 단계에서 거부된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "MetricBuilder")]
pub struct Metric {
    impression_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cdb_call_start_elapsed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cdb_call_end_elapsed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed: Option<u64>,
    cached_bid_used: bool,
    is_timeout: bool,
    ready_to_send: bool,
}

impl Metric {
    /// 빈 상태에서 시작하는 빌더
    pub fn builder(impression_id: impl Into<String>) -> MetricBuilder {
        MetricBuilder::new(impression_id)
    }

    /// 현재 스냅샷에서 시작하는 빌더
    pub fn to_builder(&self) -> MetricBuilder {
        MetricBuilder::from(self.clone())
    }

    /// 노출 ID (기본 키)
    pub fn impression_id(&self) -> &str {
        &self.impression_id
    }

    /// 같은 CDB 호출에서 나온 노출들이 공유하는 그룹 ID
    pub fn request_group_id(&self) -> Option<&str> {
        self.request_group_id.as_deref()
    }

    /// 입찰이 반환된 경우의 존 ID
    pub fn zone_id(&self) -> Option<&str> {
        self.zone_id.as_deref()
    }

    /// CDB 호출 시작 시점 (단조 시계, 밀리초)
    pub fn cdb_call_start_elapsed(&self) -> Option<u64> {
        self.cdb_call_start_elapsed
    }

    /// CDB 호출 종료 시점 (단조 시계, 밀리초). 네트워크 에러/타임아웃이면 없음
    pub fn cdb_call_end_elapsed(&self) -> Option<u64> {
        self.cdb_call_end_elapsed
    }

    /// 호출 시작부터 입찰 소비까지 걸린 시간 (밀리초). 만료 전 소비된 경우에만 존재
    pub fn elapsed(&self) -> Option<u64> {
        self.elapsed
    }

    /// 캐시된 입찰이 이 노출에 사용되었는지
    pub fn is_cached_bid_used(&self) -> bool {
        self.cached_bid_used
    }

    /// CDB 호출이 타임아웃되었는지
    pub fn is_timeout(&self) -> bool {
        self.is_timeout
    }

    /// 이벤트 시퀀스가 닫혀 전송 가능한 상태인지
    pub fn is_ready_to_send(&self) -> bool {
        self.ready_to_send
    }
}

/// [`Metric`] 빌더
///
/// 필드는 채워지기만 하고 지워지지 않는다. 불리언 플래그는 `mark_*`로만
/// 켤 수 있고, 선택 필드는 값으로만 설정할 수 있다. 같은 변경을 여러 번
/// 적용해도 결과가 같도록 모든 setter는 "X를 V로 설정" 형태다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBuilder {
    impression_id: String,
    #[serde(default)]
    request_group_id: Option<String>,
    #[serde(default)]
    zone_id: Option<String>,
    #[serde(default)]
    cdb_call_start_elapsed: Option<u64>,
    #[serde(default)]
    cdb_call_end_elapsed: Option<u64>,
    #[serde(default)]
    elapsed: Option<u64>,
    #[serde(default)]
    cached_bid_used: bool,
    #[serde(default)]
    is_timeout: bool,
    #[serde(default)]
    ready_to_send: bool,
}

impl MetricBuilder {
    /// 빈 빌더 생성
    pub fn new(impression_id: impl Into<String>) -> Self {
        Self {
            impression_id: impression_id.into(),
            request_group_id: None,
            zone_id: None,
            cdb_call_start_elapsed: None,
            cdb_call_end_elapsed: None,
            elapsed: None,
            cached_bid_used: false,
            is_timeout: false,
            ready_to_send: false,
        }
    }

    pub fn impression_id(&self) -> &str {
        &self.impression_id
    }

    /// CDB 호출 시작 시점 (없으면 `None`)
    pub fn cdb_call_start_elapsed(&self) -> Option<u64> {
        self.cdb_call_start_elapsed
    }

    pub fn cdb_call_end_elapsed(&self) -> Option<u64> {
        self.cdb_call_end_elapsed
    }

    pub fn set_request_group_id(&mut self, request_group_id: impl Into<String>) -> &mut Self {
        self.request_group_id = Some(request_group_id.into());
        self
    }

    pub fn set_zone_id(&mut self, zone_id: impl Into<String>) -> &mut Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    pub fn set_cdb_call_start_elapsed(&mut self, millis: u64) -> &mut Self {
        self.cdb_call_start_elapsed = Some(millis);
        self
    }

    pub fn set_cdb_call_end_elapsed(&mut self, millis: u64) -> &mut Self {
        self.cdb_call_end_elapsed = Some(millis);
        self
    }

    pub fn set_elapsed(&mut self, millis: u64) -> &mut Self {
        self.elapsed = Some(millis);
        self
    }

    pub fn mark_cached_bid_used(&mut self) -> &mut Self {
        self.cached_bid_used = true;
        self
    }

    pub fn mark_timeout(&mut self) -> &mut Self {
        self.is_timeout = true;
        self
    }

    pub fn mark_ready_to_send(&mut self) -> &mut Self {
        self.ready_to_send = true;
        self
    }

    /// 일관성 검증 후 불변 스냅샷 생성
    ///
    /// 불일치 상태는 저장하지 않고 `Validation` 에러로 즉시 실패한다.
    pub fn build(&self) -> Result<Metric, CoreError> {
        if self.impression_id.is_empty() {
            return Err(invalid("impression_id", "빈 노출 ID"));
        }
        if self.cdb_call_end_elapsed.is_some() && self.cdb_call_start_elapsed.is_none() {
            return Err(invalid(
                "cdb_call_end_elapsed",
                "호출 시작 시점 없이 종료 시점이 설정됨",
            ));
        }
        if self.elapsed.is_some()
            && (self.cdb_call_start_elapsed.is_none() || self.cdb_call_end_elapsed.is_none())
        {
            return Err(invalid("elapsed", "호출 시작/종료 시점 없이 소비 시간이 설정됨"));
        }
        if self.is_timeout && self.cdb_call_end_elapsed.is_some() {
            return Err(invalid("is_timeout", "타임아웃인데 호출 종료 시점이 존재함"));
        }

        Ok(Metric {
            impression_id: self.impression_id.clone(),
            request_group_id: self.request_group_id.clone(),
            zone_id: self.zone_id.clone(),
            cdb_call_start_elapsed: self.cdb_call_start_elapsed,
            cdb_call_end_elapsed: self.cdb_call_end_elapsed,
            elapsed: self.elapsed,
            cached_bid_used: self.cached_bid_used,
            is_timeout: self.is_timeout,
            ready_to_send: self.ready_to_send,
        })
    }
}

impl From<Metric> for MetricBuilder {
    fn from(metric: Metric) -> Self {
        Self {
            impression_id: metric.impression_id,
            request_group_id: metric.request_group_id,
            zone_id: metric.zone_id,
            cdb_call_start_elapsed: metric.cdb_call_start_elapsed,
            cdb_call_end_elapsed: metric.cdb_call_end_elapsed,
            elapsed: metric.elapsed,
            cached_bid_used: metric.cached_bid_used,
            is_timeout: metric.is_timeout,
            ready_to_send: metric.ready_to_send,
        }
    }
}

impl TryFrom<MetricBuilder> for Metric {
    type Error = CoreError;

    fn try_from(builder: MetricBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

fn invalid(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}
