//! Credential Codec
//!
//! 자격 증명 컬렉션 ⇄ Secret Store 바이트.
//!
//! 현재 포맷 (v1): self-describing JSON envelope
//! ```json
//! { "kind": "notion_credentials", "version": 1, "credentials": [ ... ] }
//! ```
//! 시각은 모두 RFC 3339 UTC 문자열입니다.
//!
//! 레거시 포맷: 이전 버전이 평문 설정에 저장하던 camelCase 레코드 배열
//! (시각은 epoch millis).

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::model::{Credential, CredentialCollection};
use crate::error::{CredentialError, CredentialResult};

const PAYLOAD_KIND: &str = "notion_credentials";

/// 현재 codec 버전
pub const CODEC_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    kind: &'static str,
    version: u32,
    credentials: &'a CredentialCollection,
}

/// 버전 판별용 헤더
#[derive(Deserialize)]
struct EnvelopeHeader {
    kind: String,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    credentials: CredentialCollection,
}

pub fn encode(collection: &CredentialCollection) -> CredentialResult<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef {
        kind: PAYLOAD_KIND,
        version: CODEC_VERSION,
        credentials: collection,
    })
    .map_err(|e| CredentialError::CorruptPayload(format!("encode failed: {}", e)))
}

/// 바이트 → 컬렉션. 읽을 수 없는 데이터는 빈 컬렉션이 아니라 `CorruptPayload`.
pub fn decode(bytes: &[u8]) -> CredentialResult<CredentialCollection> {
    let header: EnvelopeHeader = serde_json::from_slice(bytes)
        .map_err(|e| CredentialError::CorruptPayload(format!("unreadable envelope: {}", e)))?;

    if header.kind != PAYLOAD_KIND {
        return Err(CredentialError::CorruptPayload(format!(
            "unexpected payload kind '{}'",
            header.kind
        )));
    }
    if header.version != CODEC_VERSION {
        return Err(CredentialError::CorruptPayload(format!(
            "unsupported codec version {} (expected {})",
            header.version, CODEC_VERSION
        )));
    }

    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| CredentialError::CorruptPayload(format!("invalid credentials: {}", e)))?;

    ensure_unique_ids(envelope.credentials.iter())?;
    Ok(envelope.credentials)
}

fn ensure_unique_ids<'a>(credentials: impl Iterator<Item = &'a Credential>) -> CredentialResult<()> {
    let mut seen = HashSet::new();
    for credential in credentials {
        if !seen.insert(credential.id.as_str()) {
            return Err(CredentialError::CorruptPayload(format!(
                "duplicate credential id {}",
                credential.id
            )));
        }
    }
    Ok(())
}

// =====================================
// 레거시 포맷
// =====================================

/// 이전 버전의 평문 토큰 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyCredential {
    pub id: String,
    pub name: String,
    pub token: String,
    #[serde(rename = "workspaceName", default)]
    pub workspace_name: Option<String>,
    #[serde(rename = "workspaceIcon", default)]
    pub workspace_icon: Option<String>,
    #[serde(rename = "isValid", default)]
    pub is_valid: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<i64>,
    #[serde(rename = "lastValidated", default)]
    pub last_validated: Option<i64>,
}

impl LegacyCredential {
    pub fn into_credential(self) -> Credential {
        Credential {
            id: self.id,
            display_name: self.name,
            secret_value: self.token,
            workspace_label: self.workspace_name,
            workspace_icon: self.workspace_icon,
            created_at: self
                .created_at
                .and_then(millis_to_datetime)
                .unwrap_or_else(Utc::now),
            last_validated_at: self.last_validated.and_then(millis_to_datetime),
            is_valid: self.is_valid,
        }
    }
}

impl From<&Credential> for LegacyCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            name: credential.display_name.clone(),
            token: credential.secret_value.clone(),
            workspace_name: credential.workspace_label.clone(),
            workspace_icon: credential.workspace_icon.clone(),
            is_valid: credential.is_valid,
            created_at: Some(credential.created_at.timestamp_millis()),
            last_validated: credential.last_validated_at.map(|t| t.timestamp_millis()),
        }
    }
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// 레거시 바이트 해석. 빈 값/공백은 "데이터 없음".
pub fn decode_legacy(bytes: &[u8]) -> CredentialResult<Vec<LegacyCredential>> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| CredentialError::CorruptPayload(format!("unreadable legacy tokens: {}", e)))
}

pub fn encode_legacy(credentials: &[LegacyCredential]) -> CredentialResult<Vec<u8>> {
    serde_json::to_vec(credentials)
        .map_err(|e| CredentialError::CorruptPayload(format!("encode failed: {}", e)))
}
