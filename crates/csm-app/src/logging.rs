//! 로깅 초기화.

use tracing_subscriber::EnvFilter;

/// `tracing` fmt 구독자 설치
///
/// `RUST_LOG`가 있으면 그것을, 없으면 `filter`를 쓴다. 이미 전역 구독자가
/// 있으면 아무것도 하지 않고 `false`를 반환한다.
pub fn init_logging(filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
