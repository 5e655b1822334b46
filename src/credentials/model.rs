//! Credential Data Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notion 통합 토큰 1개 + 메타데이터
///
/// `id`, `secret_value`, `created_at`은 생성 후 변경되지 않습니다 (토큰 교체 = 삭제 후 추가).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub display_name: String,
    pub secret_value: String,
    #[serde(default)]
    pub workspace_label: Option<String>,
    #[serde(default)]
    pub workspace_icon: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_valid: bool,
}

impl Credential {
    pub fn new(display_name: impl Into<String>, secret_value: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            secret_value: secret_value.into(),
            workspace_label: None,
            workspace_icon: None,
            created_at: Utc::now(),
            last_validated_at: None,
            is_valid: false,
        }
    }

    /// 화면 표시용 마스킹 (`secret_…Ab12`)
    pub fn masked_secret(&self) -> String {
        let prefix = self
            .secret_value
            .find('_')
            .map(|i| &self.secret_value[..=i])
            .unwrap_or("");
        let tail: String = self
            .secret_value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}…{}", prefix, tail)
    }
}

// 토큰이 로그에 새지 않도록 Debug를 직접 구현
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("secret_value", &"[REDACTED]")
            .field("workspace_label", &self.workspace_label)
            .field("workspace_icon", &self.workspace_icon)
            .field("created_at", &self.created_at)
            .field("last_validated_at", &self.last_validated_at)
            .field("is_valid", &self.is_valid)
            .finish()
    }
}

/// 설치 단위 자격 증명 전체 (원자적 저장 단위)
///
/// 삽입 순서를 유지하지만 순서 자체에 의미는 없습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialCollection {
    items: Vec<Credential>,
}

impl CredentialCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Credential>) -> Self {
        Self { items }
    }

    pub fn into_vec(self) -> Vec<Credential> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Credential> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Credential> {
        self.items.iter().find(|c| c.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Credential> {
        self.items.iter_mut().find(|c| c.id == id)
    }

    /// 바이트 단위 비교
    pub fn contains_secret(&self, secret: &str) -> bool {
        self.items
            .iter()
            .any(|c| c.secret_value.as_bytes() == secret.as_bytes())
    }

    pub(crate) fn push(&mut self, credential: Credential) {
        self.items.push(credential);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Credential> {
        let index = self.items.iter().position(|c| c.id == id)?;
        Some(self.items.remove(index))
    }
}

impl<'a> IntoIterator for &'a CredentialCollection {
    type Item = &'a Credential;
    type IntoIter = std::slice::Iter<'a, Credential>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
