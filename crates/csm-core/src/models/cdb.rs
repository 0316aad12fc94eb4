//! CDB(입찰 서버) 호출 모델.
//!
//! 라이프사이클 리스너가 받는 입력만 정의한다. 입찰 캐시/선택 로직은
//! 이 crate 밖에 있으며, 여기서는 노출 ID와 그룹 ID, 응답 유효성만 다룬다.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 새 노출 ID 생성 (하이픈 없는 UUID v4)
pub fn new_impression_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// CDB 입찰 요청. `id`는 같은 호출로 묶인 노출들의 요청 그룹 ID다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdbRequest {
    pub id: String,
    pub profile_id: u32,
    pub slots: Vec<CdbRequestSlot>,
}

impl CdbRequest {
    /// 새 요청 그룹 ID로 요청 생성
    pub fn new(profile_id: u32, slots: Vec<CdbRequestSlot>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            profile_id,
            slots,
        }
    }

    pub fn impression_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.impression_id.as_str())
    }
}

/// 요청 슬롯 (광고 지면 하나)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdbRequestSlot {
    #[serde(rename = "impId")]
    pub impression_id: String,
    pub placement_id: String,
}

impl CdbRequestSlot {
    /// 새 노출 ID로 슬롯 생성
    pub fn new(placement_id: impl Into<String>) -> Self {
        Self {
            impression_id: new_impression_id(),
            placement_id: placement_id.into(),
        }
    }
}

/// CDB 응답
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdbResponse {
    #[serde(default)]
    pub slots: Vec<CdbResponseSlot>,
}

impl CdbResponse {
    /// 노출 ID에 해당하는 응답 슬롯. 없으면 no-fill
    pub fn slot_by_impression_id(&self, impression_id: &str) -> Option<&CdbResponseSlot> {
        self.slots
            .iter()
            .find(|slot| slot.impression_id == impression_id)
    }
}

/// 응답 슬롯 (입찰 하나)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdbResponseSlot {
    #[serde(rename = "impId")]
    pub impression_id: String,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub cpm: String,
    #[serde(default)]
    pub display_url: String,
    /// 입찰 유효 시간 (초)
    #[serde(default)]
    pub ttl: u64,
}

impl CdbResponseSlot {
    /// CPM이 0 이상의 숫자이고 렌더링 URL이 있는 경우에만 유효
    pub fn is_valid(&self) -> bool {
        let cpm_ok = self
            .cpm
            .trim()
            .parse::<f64>()
            .map(|cpm| cpm.is_finite() && cpm >= 0.0)
            .unwrap_or(false);
        cpm_ok && !self.display_url.trim().is_empty()
    }
}

/// 캐시된 입찰 (소비 시점에 전달됨)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub impression_id: String,
    pub zone_id: Option<String>,
    /// 만료 시점 (단조 시계, 밀리초)
    pub expires_at_millis: u64,
}

impl Bid {
    /// 응답 슬롯과 수신 시점으로 입찰 생성
    pub fn from_slot(slot: &CdbResponseSlot, received_at_millis: u64) -> Self {
        Self {
            impression_id: slot.impression_id.clone(),
            zone_id: slot.zone_id.clone(),
            expires_at_millis: received_at_millis.saturating_add(slot.ttl.saturating_mul(1_000)),
        }
    }

    /// 주어진 시각에 만료되었는지. 시계가 크게 점프한 경우도 만료로 본다
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at_millis
    }
}

/// CDB 호출 실패 유형
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdbCallFailure {
    /// 설정된 타임아웃 초과
    Timeout,
    /// 그 외 네트워크/I/O 에러
    Network(String),
}

impl CdbCallFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CdbCallFailure::Timeout)
    }
}
