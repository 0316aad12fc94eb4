//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! 각 어댑터 crate가 이 trait들을 구현하며,
//! `csm-app`에서 `Arc<dyn T>`로 와이어링한다.
//!
//! 네트워크 포트는 `async_trait` 매크로로 object safety를 보장한다.
//! 메트릭 저장소 포트는 호출자 입장에서 동기식이다.

pub mod api_client;
pub mod clock;
pub mod metric_repository;
