//! 애플리케이션 설정 구조체.
//!
//! CSM 수집/전송 설정, 네트워크 설정, 로깅 설정을 정의한다.
//! `ConfigManager`를 통해 JSON 파일에서 로드/저장한다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CSM 수집/전송 설정
    #[serde(default)]
    pub csm: CsmConfig,
    /// CSM 서버 연결 설정
    #[serde(default)]
    pub network: NetworkConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 기본 설정
    pub fn default_config() -> Self {
        Self::default()
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.csm.max_batch_size == 0 {
            return Err(CoreError::Config(
                "csm.max_batch_size는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.network.base_url.trim().is_empty() {
            return Err(CoreError::Config("network.base_url이 비어 있습니다".to_string()));
        }
        if self.network.timeout_ms == 0 {
            return Err(CoreError::Config(
                "network.timeout_ms는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// CSM 설정
// ============================================================

/// CSM 설정: 메트릭 수집 활성화, 저장 위치, 배치 헤더
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsmConfig {
    /// CSM 수집 전체 활성화 여부 (원격 킬 스위치)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 메트릭 디렉토리 (없으면 플랫폼 데이터 디렉토리 아래 `csm`)
    #[serde(default)]
    pub metrics_dir: Option<PathBuf>,
    /// 배치 하나에 담을 최대 메트릭 수
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// 연동 프로필 ID (배치 헤더)
    #[serde(default = "default_profile_id")]
    pub profile_id: u32,
    /// SDK 버전 (배치 헤더)
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,
}

impl Default for CsmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_dir: None,
            max_batch_size: default_max_batch_size(),
            profile_id: default_profile_id(),
            sdk_version: default_sdk_version(),
        }
    }
}

// ============================================================
// 네트워크 설정
// ============================================================

/// CSM 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 서버 기본 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 재시도 가능한 에러의 최대 재시도 횟수
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

// ============================================================
// 로깅 설정
// ============================================================

/// 로깅 설정: `RUST_LOG`가 없을 때 쓰는 필터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_batch_size() -> usize {
    100
}

fn default_profile_id() -> u32 {
    235
}

fn default_sdk_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_base_url() -> String {
    "https://csm.example.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"csm":{"enabled":false},"network":{"timeout_ms":500}}"#)
                .unwrap();
        assert!(!config.csm.enabled);
        assert_eq!(config.csm.max_batch_size, 100);
        assert_eq!(config.network.timeout(), Duration::from_millis(500));
        assert_eq!(config.network.max_retries, 2);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let mut config = AppConfig::default_config();
        assert!(config.validate().is_ok());

        config.csm.max_batch_size = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn validate_rejects_empty_base_url() {
        let mut config = AppConfig::default_config();
        config.network.base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
