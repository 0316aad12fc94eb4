//! # csm-storage
//!
//! 로컬 메트릭 저장소 어댑터.
//! 노출 ID당 JSON 레코드 파일 하나를 두고, 임시 파일 + rename으로
//! 원자적으로 갱신한다.
//!
//! ## 모듈
//! - `metric_directory`: 디렉토리 레이아웃, 파일명 규칙, 임시 파일 정리
//! - `metric_storage_unit`: 레코드 하나의 단일 작성자 저장 단위
//! - `file_repository`: `MetricRepository` 구현

pub mod file_repository;
pub mod metric_directory;
pub mod metric_storage_unit;

pub use file_repository::FileMetricRepository;
pub use metric_directory::MetricDirectory;
pub use metric_storage_unit::MetricStorageUnit;
