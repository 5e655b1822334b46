//! 공유 설정 (non-secret)
//!
//! 공유 스토어의 `settings` namespace를 사용합니다.
//! 여기 있는 키 이름은 배포된 앱들이 공유하므로 호환 shim 없이 바꾸면 안 됩니다.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{SharedStore, SharedStoreError};

const SETTINGS_NAMESPACE: &str = "settings";

/// 레거시 → Secret Store 마이그레이션 완료 플래그
pub const MIGRATION_FLAG_KEY: &str = "notion_tokens_migrated_to_keychain";

/// 이전 버전이 토큰을 평문으로 저장하던 위치
pub const LEGACY_TOKENS_KEY: &str = "notion_tokens";

/// 설정 오류
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Store(#[from] SharedStoreError),

    #[error("Setting {key} is not valid JSON: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<SharedStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<SharedStore>) -> Self {
        Self { store }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        match self.store.get(SETTINGS_NAMESPACE, key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| SettingsError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SettingsError> {
        let bytes = serde_json::to_vec(value).map_err(|source| SettingsError::Decode {
            key: key.to_string(),
            source,
        })?;
        self.store.put(SETTINGS_NAMESPACE, key, &bytes)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool, SettingsError> {
        Ok(self.store.remove(SETTINGS_NAMESPACE, key)?)
    }

    // =====================================
    // 마이그레이션 플래그
    // =====================================

    /// 읽을 수 없는 값은 false로 취급 (재마이그레이션은 upsert라 안전)
    pub fn migration_flag(&self) -> Result<bool, SettingsError> {
        match self.get::<bool>(MIGRATION_FLAG_KEY) {
            Ok(flag) => Ok(flag.unwrap_or(false)),
            Err(SettingsError::Decode { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// false → true 단방향
    pub fn set_migration_flag(&self) -> Result<(), SettingsError> {
        self.set(MIGRATION_FLAG_KEY, &true)
    }

    /// 개발자 전용 리셋 도구
    pub fn reset_migration_flag(&self) -> Result<(), SettingsError> {
        tracing::warn!("Migration flag reset (developer tooling)");
        self.remove(MIGRATION_FLAG_KEY).map(|_| ())
    }

    // =====================================
    // 레거시 평문 저장 위치
    // =====================================

    /// 레거시 위치의 원본 바이트 (해석은 codec이 담당)
    pub fn legacy_tokens_raw(&self) -> Result<Option<Vec<u8>>, SettingsError> {
        Ok(self.store.get(SETTINGS_NAMESPACE, LEGACY_TOKENS_KEY)?)
    }

    /// 이전 버전 앱이 쓰던 방식 그대로 기록 (테스트 및 다운그레이드 시뮬레이션용)
    pub fn write_legacy_tokens_raw(&self, bytes: &[u8]) -> Result<(), SettingsError> {
        Ok(self.store.put(SETTINGS_NAMESPACE, LEGACY_TOKENS_KEY, bytes)?)
    }

    /// 멱등 삭제
    pub fn erase_legacy_tokens(&self) -> Result<(), SettingsError> {
        self.remove(LEGACY_TOKENS_KEY).map(|_| ())
    }
}
