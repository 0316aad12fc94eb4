//! CSM 핵심 에러 타입.
//!
//! 저장소/네트워크 어댑터 crate는 모두 이 타입으로 에러를 반환한다.
//! 저장소 에러는 리포지토리 레이어에서 로깅 후 흡수되며,
//! 광고 서빙 경로까지 전파되지 않는다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 메트릭 레코드 쓰기 실패 (디스크 부족, 권한 등). 이전 레코드는 유지된다.
    #[error("메트릭 저장 실패 ({impression_id}): {message}")]
    StorageWrite {
        /// 대상 노출 ID
        impression_id: String,
        /// 실패 사유
        message: String,
    },

    /// 메트릭 레코드 읽기 실패 (누락, 손상). 해당 메트릭은 유실된 것으로 본다.
    #[error("메트릭 읽기 실패 ({impression_id}): {message}")]
    StorageRead {
        /// 대상 노출 ID (파일명에서 복원 불가하면 경로)
        impression_id: String,
        /// 실패 사유
        message: String,
    },

    /// 배치 전송 실패. 배치 전체가 다음 전송 때 재시도된다.
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패 (내부 불일치 메트릭 등 프로그래밍 오류)
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 전송 실패로 간주되는 에러인지 (파이프라인 재큐잉 대상)
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            CoreError::Transport(_)
                | CoreError::Network(_)
                | CoreError::RateLimit { .. }
                | CoreError::ServiceUnavailable(_)
        )
    }
}
