//! CSM 런타임.
//!
//! 어댑터를 조립하고 전송 워커의 시작/종료를 관리한다.
//! tokio 런타임 안에서 시작해야 한다.

use anyhow::{Context, Result};
use csm_core::config::AppConfig;
use csm_core::config_manager::ConfigManager;
use csm_core::ports::api_client::CsmApiClient;
use csm_core::ports::clock::{Clock, MonotonicClock};
use csm_core::ports::metric_repository::MetricRepository;
use csm_network::{spawn_worker, HttpCsmClient, MetricSendingPipeline, SendTrigger};
use csm_storage::FileMetricRepository;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lifecycle_listener::CsmBidLifecycleListener;

/// 실행 중인 CSM 서브시스템
pub struct CsmRuntime {
    repository: Arc<FileMetricRepository>,
    pipeline: Arc<MetricSendingPipeline>,
    listener: Arc<CsmBidLifecycleListener>,
    trigger: SendTrigger,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl CsmRuntime {
    /// 설정 관리자의 현재 설정으로 시작
    pub fn from_config_manager(manager: &ConfigManager) -> Result<Self> {
        Self::start(&manager.get(), manager.metrics_dir())
    }

    /// HTTP 클라이언트와 단조 시계로 시작
    pub fn start(config: &AppConfig, metrics_dir: PathBuf) -> Result<Self> {
        let client = HttpCsmClient::new(&config.network.base_url, config.network.timeout())
            .context("CSM HTTP 클라이언트 생성 실패")?
            .with_max_retries(config.network.max_retries);

        Self::start_with(
            config,
            metrics_dir,
            Arc::new(client),
            Arc::new(MonotonicClock::new()),
        )
    }

    /// 주어진 클라이언트와 시계로 시작
    pub fn start_with(
        config: &AppConfig,
        metrics_dir: PathBuf,
        api_client: Arc<dyn CsmApiClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate().context("CSM 설정 검증 실패")?;

        let repository = Arc::new(
            FileMetricRepository::open(&metrics_dir)
                .with_context(|| format!("메트릭 디렉토리 열기 실패: {}", metrics_dir.display()))?,
        );

        let pipeline = Arc::new(MetricSendingPipeline::new(
            repository.clone(),
            api_client,
            config.csm.profile_id,
            config.csm.sdk_version.clone(),
            config.csm.max_batch_size,
        ));

        let trigger = SendTrigger::new();
        let listener = Arc::new(CsmBidLifecycleListener::new(
            repository.clone(),
            clock,
            trigger.clone(),
            config.csm.enabled,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = spawn_worker(pipeline.clone(), trigger.clone(), shutdown_rx);

        info!(
            "CSM 런타임 시작: dir={}, enabled={}, profile_id={}",
            metrics_dir.display(),
            config.csm.enabled,
            config.csm.profile_id
        );

        Ok(Self {
            repository,
            pipeline,
            listener,
            trigger,
            shutdown_tx,
            worker,
        })
    }

    /// SDK에 넘길 라이프사이클 리스너
    pub fn listener(&self) -> Arc<CsmBidLifecycleListener> {
        self.listener.clone()
    }

    pub fn repository(&self) -> Arc<dyn MetricRepository> {
        self.repository.clone()
    }

    pub fn pipeline(&self) -> Arc<MetricSendingPipeline> {
        self.pipeline.clone()
    }

    /// 전송 요청
    pub fn trigger_send(&self) {
        self.trigger.trigger();
    }

    /// 워커를 멈추고, CSM이 켜져 있으면 남은 메트릭을 한 번 더 보낸다
    ///
    /// 마지막 전송이 실패해도 메트릭은 디스크에 남아 다음 실행에서 전송된다.
    pub async fn shutdown(self) -> Result<()> {
        info!("CSM 런타임 종료");
        let _ = self.shutdown_tx.send(true);
        self.worker.await.context("CSM 전송 워커 join 실패")?;

        if self.listener.is_enabled() {
            if let Err(e) = self.pipeline.send_all_pending().await {
                warn!("종료 전 CSM 전송 실패, 다음 실행에서 재시도: {e}");
            }
        }
        Ok(())
    }
}
