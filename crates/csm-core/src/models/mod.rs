//! CSM 도메인 모델.
//!
//! 메트릭 스냅샷/빌더, 전송 요청, CDB 호출 입력 모델을 정의한다.
//! 모든 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod cdb;
pub mod metric;
pub mod metric_request;
