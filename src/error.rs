//! Credential Error Types
//!
//! 자격 증명 라이프사이클 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

use crate::db::SharedStoreError;
use crate::secrets::SecretStoreError;

/// 자격 증명 라이프사이클 에러
///
/// 프레젠테이션 계층은 종류별로 서로 다른 메시지를 보여줍니다.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Invalid token format. Token should be 'secret_' + 43 or 'ntn_' + 46 alphanumeric characters")]
    InvalidFormat,

    #[error("This token is already registered")]
    DuplicateSecret,

    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Secret store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Stored credentials could not be decoded: {0}")]
    CorruptPayload(String),

    #[error("Validation unavailable: {0}")]
    ValidationUnavailable(String),

    #[error("Token rejected by Notion: {0}")]
    ValidationRejected(String),
}

impl CredentialError {
    /// 재시도로 해결될 수 있는 에러인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CredentialError::StoreUnavailable(_) | CredentialError::ValidationUnavailable(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            CredentialError::InvalidFormat => "INVALID_FORMAT",
            CredentialError::DuplicateSecret => "DUPLICATE_SECRET",
            CredentialError::NotFound(_) => "NOT_FOUND",
            CredentialError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            CredentialError::CorruptPayload(_) => "CORRUPT_PAYLOAD",
            CredentialError::ValidationUnavailable(_) => "VALIDATION_UNAVAILABLE",
            CredentialError::ValidationRejected(_) => "VALIDATION_REJECTED",
        }
    }
}

impl From<SecretStoreError> for CredentialError {
    fn from(err: SecretStoreError) -> Self {
        match err {
            // 저장된 바이트를 읽을 수 없는 경우는 "데이터 없음"과 구분해야 함
            SecretStoreError::Corrupt(detail) => CredentialError::CorruptPayload(detail),
            other => CredentialError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<SharedStoreError> for CredentialError {
    fn from(err: SharedStoreError) -> Self {
        CredentialError::StoreUnavailable(err.to_string())
    }
}

/// 프레젠테이션 계층 응답용 직렬화 가능한 에러
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&CredentialError> for ErrorReport {
    fn from(error: &CredentialError) -> Self {
        ErrorReport {
            code: error.code().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

impl From<CredentialError> for ErrorReport {
    fn from(error: CredentialError) -> Self {
        ErrorReport::from(&error)
    }
}

/// 라이프사이클 매니저 결과 타입
pub type CredentialResult<T> = Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(CredentialError::StoreUnavailable("locked".into()).is_retryable());
        assert!(CredentialError::ValidationUnavailable("timeout".into()).is_retryable());
        assert!(!CredentialError::InvalidFormat.is_retryable());
        assert!(!CredentialError::DuplicateSecret.is_retryable());
        assert!(!CredentialError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_corrupt_secret_maps_to_corrupt_payload() {
        let err: CredentialError = SecretStoreError::Corrupt("bad base64".into()).into();
        assert!(matches!(err, CredentialError::CorruptPayload(_)));

        let err: CredentialError = SecretStoreError::Unavailable("locked".into()).into();
        assert!(matches!(err, CredentialError::StoreUnavailable(_)));
    }

    #[test]
    fn test_error_report_serializes_camel_case() {
        let report = ErrorReport::from(CredentialError::StoreUnavailable("device locked".into()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["code"], "STORE_UNAVAILABLE");
        assert_eq!(json["retryable"], true);
        assert!(json["message"].as_str().unwrap().contains("device locked"));
    }
}
