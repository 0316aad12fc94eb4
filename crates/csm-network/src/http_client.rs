//! HTTP CSM 클라이언트.
//!
//! `CsmApiClient` 포트 구현. JSON 배치 POST + 재시도 로직.

use async_trait::async_trait;
use csm_core::error::CoreError;
use csm_core::models::metric_request::MetricRequest;
use csm_core::ports::api_client::CsmApiClient;
use std::time::Duration;
use tracing::{debug, warn};

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Retry-After 헤더가 없을 때 대기 시간 (초)
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 재시도 대기 상한 (Retry-After 포함)
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// CSM 수집 경로
const CSM_PATH: &str = "/csm";

/// 재시도 가능한 에러인지 판별
fn is_retryable(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Network(_) | CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. }
    )
}

/// 서버가 지정한 대기 시간. 상한을 넘지 않는다
fn retry_after_delay(retry_after_secs: u64) -> Duration {
    Duration::from_secs(retry_after_secs).min(MAX_BACKOFF)
}

/// REST CSM 클라이언트 (`CsmApiClient` 포트 구현)
pub struct HttpCsmClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpCsmClient {
    /// 새 HTTP CSM 클라이언트 생성
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 첫 재시도 대기 시간 설정 (이후 2배씩, 최대 30초)
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(&self, resp: reqwest::Response) -> Result<(), CoreError> {
        let status = resp.status();

        if status.is_success() {
            return Ok(());
        }

        let retry_after_secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        match status.as_u16() {
            429 => Err(CoreError::RateLimit { retry_after_secs }),
            503 => Err(CoreError::ServiceUnavailable(text)),
            _ => Err(CoreError::Transport(format!("CSM 전송 거부 ({status}): {text}"))),
        }
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = self.initial_backoff;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }

                    attempt += 1;
                    // RateLimit의 경우 서버 지정 대기 시간 사용
                    if let CoreError::RateLimit { retry_after_secs } = &e {
                        delay = retry_after_delay(*retry_after_secs);
                    }

                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        attempt,
                        self.max_retries + 1
                    );

                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

#[async_trait]
impl CsmApiClient for HttpCsmClient {
    async fn post_csm(&self, request: &MetricRequest) -> Result<(), CoreError> {
        debug!("CSM 배치 전송: {} 피드백", request.feedbacks.len());

        let url = format!("{}{}", self.base_url, CSM_PATH);
        self.execute_with_retry(|| async {
            let resp = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| CoreError::Network(format!("CSM 전송 요청 실패: {e}")))?;

            self.check_response(resp).await?;
            debug!("CSM 배치 전송 성공");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csm_core::models::metric::Metric;

    fn sample_request() -> MetricRequest {
        let metric = Metric::builder("imp_1")
            .set_request_group_id("grp_1")
            .set_cdb_call_start_elapsed(10)
            .set_cdb_call_end_elapsed(130)
            .set_zone_id("42")
            .mark_cached_bid_used()
            .mark_ready_to_send()
            .build()
            .unwrap();
        MetricRequest::from_metrics([&metric], "1.2.3", 235)
    }

    fn client_for(server: &mockito::ServerGuard) -> HttpCsmClient {
        HttpCsmClient::new(&server.url(), Duration::from_secs(5))
            .unwrap()
            .with_initial_backoff(Duration::from_millis(10))
    }

    #[test]
    fn create_client() {
        let client =
            HttpCsmClient::new("http://localhost:8000/", Duration::from_secs(30)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn with_max_retries() {
        let client = HttpCsmClient::new("http://localhost:8000", Duration::from_secs(30))
            .unwrap()
            .with_max_retries(5);
        assert_eq!(client.max_retries, 5);
    }

    #[test]
    fn is_retryable_errors() {
        assert!(is_retryable(&CoreError::Network("test".to_string())));
        assert!(is_retryable(&CoreError::ServiceUnavailable(
            "test".to_string()
        )));
        assert!(is_retryable(&CoreError::RateLimit {
            retry_after_secs: 60
        }));
        assert!(!is_retryable(&CoreError::Transport("test".to_string())));
        assert!(!is_retryable(&CoreError::Internal("test".to_string())));
    }

    #[test]
    fn retry_after_is_capped() {
        assert_eq!(retry_after_delay(7), Duration::from_secs(7));
        assert_eq!(retry_after_delay(DEFAULT_RETRY_AFTER_SECS), MAX_BACKOFF);
        assert_eq!(retry_after_delay(u64::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn post_csm_success() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&server);

        let mock = server
            .mock("POST", "/csm")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "wrapper_version": "1.2.3",
                "profile_id": 235,
                "feedbacks": [{
                    "slots": [{"impressionId": "imp_1", "zoneId": "42", "cachedBidUsed": true}],
                    "isTimeout": false,
                    "cdbCallStartElapsed": 0,
                    "cdbCallEndElapsed": 120,
                    "requestGroupId": "grp_1"
                }]
            })))
            .with_status(204)
            .create_async()
            .await;

        let result = client.post_csm(&sample_request()).await;
        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&server);

        let mock = server
            .mock("POST", "/csm")
            .with_status(500)
            .with_body("Internal Server Error")
            .expect(1)
            .create_async()
            .await;

        let result = client.post_csm(&sample_request()).await;
        assert!(matches!(result, Err(CoreError::Transport(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_429() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&server).with_max_retries(0); // 재시도 없이 즉시 실패

        let mock = server
            .mock("POST", "/csm")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body("Too Many Requests")
            .create_async()
            .await;

        let result = client.post_csm(&sample_request()).await;
        assert!(matches!(
            result,
            Err(CoreError::RateLimit {
                retry_after_secs: 7
            })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn service_unavailable_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&server).with_max_retries(2);

        let mock = server
            .mock("POST", "/csm")
            .with_status(503)
            .with_body("Service Unavailable")
            .expect(3)
            .create_async()
            .await;

        let result = client.post_csm(&sample_request()).await;
        assert!(matches!(result, Err(CoreError::ServiceUnavailable(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // 닫힌 포트
        let client = HttpCsmClient::new("http://127.0.0.1:1", Duration::from_secs(2))
            .unwrap()
            .with_max_retries(0);

        let result = client.post_csm(&sample_request()).await;
        assert!(matches!(result, Err(CoreError::Network(_))));
    }
}
