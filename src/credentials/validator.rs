//! 외부 토큰 검증기 인터페이스
//!
//! 실제 구현은 `notion::NotionClient` (GET /v1/users/me).

use std::time::Duration;

use async_trait::async_trait;

/// 검증 성공 시 채워지는 워크스페이스 정보
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub label: Option<String>,
    pub icon: Option<String>,
}

/// 검증 실패 종류
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("token rejected: {0}")]
    Invalid(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
}

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, secret: &str) -> Result<WorkspaceInfo, ValidationFailure>;
}
