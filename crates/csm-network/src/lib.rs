//! # csm-network
//!
//! CSM 전송 어댑터.
//! 준비된 메트릭을 배치로 묶어 CSM 서버에 보내고, 결과에 따라
//! 저장소에서 삭제하거나 다음 전송을 위해 남겨 둔다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use csm_network::http_client::HttpCsmClient;
//! use csm_network::sending_pipeline::MetricSendingPipeline;
//! use csm_network::send_worker::{spawn_worker, SendTrigger};
//!
//! let client = Arc::new(HttpCsmClient::new(&config.network.base_url, config.network.timeout())?);
//! let pipeline = Arc::new(MetricSendingPipeline::new(repository, client, 235, "1.0.0", 100));
//! let trigger = SendTrigger::new();
//! let handle = spawn_worker(pipeline, trigger.clone(), shutdown_rx);
//! trigger.trigger();
//! ```

pub mod http_client;
pub mod send_worker;
pub mod sending_pipeline;

pub use http_client::HttpCsmClient;
pub use send_worker::{spawn_worker, SendTrigger};
pub use sending_pipeline::{MetricSendingPipeline, PipelineStats};
