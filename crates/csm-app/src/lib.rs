//! # csm-app
//!
//! CSM 서브시스템 와이어링.
//! 설정 → 파일 저장소 → HTTP 클라이언트 → 전송 파이프라인 → 워커를 조립하고,
//! 입찰 라이프사이클 리스너를 SDK에 노출한다.

pub mod lifecycle_listener;
pub mod logging;
pub mod runtime;

pub use lifecycle_listener::CsmBidLifecycleListener;
pub use logging::init_logging;
pub use runtime::CsmRuntime;
