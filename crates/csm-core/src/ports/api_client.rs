//! CSM API 클라이언트 포트.
//!
//! 구현: `csm-network` crate (reqwest)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::metric_request::MetricRequest;

/// CSM 배치 전송 클라이언트
///
/// 전송은 배치 단위로 전부 성공하거나 전부 실패한다. 부분 성공은 가정하지 않는다.
#[async_trait]
pub trait CsmApiClient: Send + Sync {
    /// 메트릭 배치 전송
    async fn post_csm(&self, request: &MetricRequest) -> Result<(), CoreError>;
}
