//! 백그라운드 전송 워커.
//!
//! 타이머 없이 라이프사이클 이벤트가 보낸 트리거로만 깨어난다.
//! 워커가 전송 중일 때 들어온 트리거는 하나로 합쳐져 다음 회차를 한 번 더 돌린다.

use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sending_pipeline::MetricSendingPipeline;

/// 전송 트리거 (복제해서 여러 곳에서 사용)
#[derive(Debug, Clone, Default)]
pub struct SendTrigger {
    notify: Arc<Notify>,
}

impl SendTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 전송 요청. 대기 중인 워커가 없으면 다음 대기 때 바로 깨어난다
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// 전송 워커 시작
///
/// 트리거마다 준비된 메트릭을 모두 보낸다. 실패는 로그만 남기고 다음 트리거를 기다린다.
pub fn spawn_worker(
    pipeline: Arc<MetricSendingPipeline>,
    trigger: SendTrigger,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("CSM 전송 워커 시작");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = trigger.notified() => {
                    match pipeline.send_all_pending().await {
                        Ok(0) => {}
                        Ok(sent) => debug!("CSM 메트릭 {sent}개 전송"),
                        Err(e) => warn!("CSM 전송 실패, 다음 트리거에 재시도: {e}"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("CSM 전송 워커 종료");
                    break;
                }
            }
        }
    })
}
