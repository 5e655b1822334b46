//! Notion REST API 클라이언트
//!
//! 토큰을 보관하지 않습니다. 호출마다 토큰을 인자로 받으며, 두 가지 역할만 합니다.
//! - `CredentialValidator`: `GET /v1/users/me`
//! - `RecordFetcher`: `POST /v1/databases/{id}/query` (최근 수정순)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::cache::snapshots::{FetchError, RecordFetcher};
use crate::credentials::validator::{CredentialValidator, ValidationFailure, WorkspaceInfo};
use crate::notion::types::*;

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion REST API 클라이언트
#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
}

impl NotionClient {
    pub fn new() -> Self {
        Self::with_base_url(NOTION_API_BASE)
    }

    /// 프록시/테스트 서버용
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 공통 헤더 설정
    fn authorized(&self, request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", token))
            .header("Notion-Version", NOTION_VERSION)
    }

    /// 요청 전송 후 (status, body, Retry-After) 반환
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String, Option<Duration>), ValidationFailure> {
        let response = request
            .send()
            .await
            .map_err(|e| ValidationFailure::Network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| ValidationFailure::Network(format!("Failed to read response: {}", e)))?;

        Ok((status, body, retry_after))
    }

    /// 토큰 소유 bot 사용자 조회
    pub async fn get_me(&self, token: &str) -> Result<UserMe, ValidationFailure> {
        let url = format!("{}/users/me", self.base_url);
        let (status, body, retry_after) = self.send(self.authorized(self.http.get(&url), token)).await?;
        classify_response(status, &body, retry_after)?;

        serde_json::from_str(&body)
            .map_err(|e| ValidationFailure::Network(format!("Failed to parse response: {}", e)))
    }

    /// 데이터베이스를 최근 수정순으로 조회
    pub async fn query_recent(
        &self,
        token: &str,
        database_id: &str,
        page_size: u32,
    ) -> Result<DatabaseQueryResponse, ValidationFailure> {
        let id = normalize_id(database_id);
        let url = format!("{}/databases/{}/query", self.base_url, id);
        let request_body = DatabaseQueryRequest::recently_edited(page_size);

        tracing::debug!(database_id = %id, page_size, "Querying database");

        let request = self
            .authorized(self.http.post(&url), token)
            .header("Content-Type", "application/json")
            .json(&request_body);
        let (status, body, retry_after) = self.send(request).await?;
        classify_response(status, &body, retry_after)?;

        serde_json::from_str(&body)
            .map_err(|e| ValidationFailure::Network(format!("Failed to parse response: {}", e)))
    }
}

impl Default for NotionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialValidator for NotionClient {
    async fn validate(&self, secret: &str) -> Result<WorkspaceInfo, ValidationFailure> {
        let me = self.get_me(secret).await?;
        Ok(WorkspaceInfo {
            label: me.workspace_label(),
            icon: me.avatar_url,
        })
    }
}

#[async_trait]
impl RecordFetcher for NotionClient {
    async fn fetch_recent(
        &self,
        secret: &str,
        source_id: &str,
        limit: usize,
    ) -> Result<Vec<Page>, FetchError> {
        let page_size = u32::try_from(limit.clamp(1, 100)).unwrap_or(100);
        let response = self
            .query_recent(secret, source_id, page_size)
            .await
            .map_err(FetchError::from)?;
        Ok(response.results)
    }
}

/// HTTP 응답 분류
///
/// - 2xx: 성공
/// - 401/403: 토큰 거부
/// - 429: rate limit
/// - 408/5xx: 일시적 네트워크 문제
/// - 그 외 4xx: 요청 거부
pub fn classify_response(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> Result<(), ValidationFailure> {
    if status.is_success() {
        return Ok(());
    }

    let detail = match serde_json::from_str::<NotionError>(body) {
        Ok(error) if !error.message.is_empty() => {
            format!("Notion API error: {} ({})", error.message, error.code)
        }
        _ => format!("Request failed with status {}", status),
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(ValidationFailure::RateLimited { retry_after })
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        Err(ValidationFailure::Network(detail))
    } else {
        Err(ValidationFailure::Invalid(detail))
    }
}

/// ID 정규화 (URL에서 추출, 하이픈 제거 등)
pub fn normalize_id(id_or_url: &str) -> String {
    let id = if id_or_url.contains("notion.so") || id_or_url.contains("notion.site") {
        // 예: https://www.notion.so/Page-Title-1234567890abcdef1234567890abcdef?v=...
        let last_segment = id_or_url.rsplit('/').next().unwrap_or(id_or_url);
        let without_query = last_segment.split('?').next().unwrap_or(last_segment);
        without_query
            .rsplit('-')
            .next()
            .unwrap_or(without_query)
            .to_string()
    } else {
        id_or_url.trim().to_string()
    };

    id.replace('-', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert!(classify_response(StatusCode::OK, "{}", None).is_ok());
    }

    #[test]
    fn test_classify_rejections() {
        let body = r#"{"object":"error","status":401,"code":"unauthorized","message":"API token is invalid."}"#;
        match classify_response(StatusCode::UNAUTHORIZED, body, None) {
            Err(ValidationFailure::Invalid(detail)) => {
                assert!(detail.contains("API token is invalid."));
                assert!(detail.contains("unauthorized"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, "", None),
            Err(ValidationFailure::Invalid(_))
        ));
        assert!(matches!(
            classify_response(StatusCode::NOT_FOUND, "not json", None),
            Err(ValidationFailure::Invalid(_))
        ));
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(
            classify_response(
                StatusCode::TOO_MANY_REQUESTS,
                "",
                Some(Duration::from_secs(2))
            ),
            Err(ValidationFailure::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            })
        );
        assert!(matches!(
            classify_response(StatusCode::BAD_GATEWAY, "", None),
            Err(ValidationFailure::Network(_))
        ));
        assert!(matches!(
            classify_response(StatusCode::REQUEST_TIMEOUT, "", None),
            Err(ValidationFailure::Network(_))
        ));
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(
            normalize_id("https://www.notion.so/acme/Roadmap-1234567890abcdef1234567890abcdef?v=abc"),
            "1234567890abcdef1234567890abcdef"
        );
        assert_eq!(
            normalize_id("12345678-90ab-cdef-1234-567890abcdef"),
            "1234567890abcdef1234567890abcdef"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = NotionClient::with_base_url("http://localhost:9999/v1/");
        assert_eq!(client.base_url, "http://localhost:9999/v1");
    }
}
