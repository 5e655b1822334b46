//! Shared Cache
//!
//! 메인 앱이 파생 데이터 스냅샷을 기록하고, 확장 프로세스는 네트워크 없이 읽기만 합니다.
//! 엔트리는 `{ schema_version, cached_at, payload }` 통째로 교체됩니다.
//! 읽기 경로에서는 어떤 실패도 오류로 올리지 않고 `None`(= placeholder)으로 처리합니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::freshness::{self, EntryMeta, Freshness};
use crate::db::{SharedStore, SharedStoreError};

const CACHE_NAMESPACE: &str = "cache";

/// 캐시 쓰기 오류 (읽기는 오류를 반환하지 않음)
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] SharedStoreError),

    #[error("Failed to encode cache entry {key}: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
struct EntryRef<'a, T> {
    schema_version: u32,
    cached_at: DateTime<Utc>,
    payload: &'a T,
}

#[derive(Deserialize)]
struct StoredEntry {
    schema_version: u32,
    cached_at: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

impl StoredEntry {
    fn meta(&self) -> EntryMeta {
        EntryMeta {
            schema_version: self.schema_version,
            cached_at: self.cached_at,
        }
    }
}

/// 논리 키 `<purpose>_<owning-id>`
pub fn cache_key(purpose: &str, owner_id: &str) -> String {
    format!("{}_{}", purpose, owner_id)
}

#[derive(Clone)]
pub struct SharedCache {
    store: Arc<SharedStore>,
}

impl SharedCache {
    pub fn new(store: Arc<SharedStore>) -> Self {
        Self { store }
    }

    /// 엔트리 전체 교체
    pub fn write<T: Serialize>(
        &self,
        key: &str,
        schema_version: u32,
        payload: &T,
    ) -> Result<(), CacheError> {
        self.write_at(key, schema_version, payload, Utc::now())
    }

    pub fn write_at<T: Serialize>(
        &self,
        key: &str,
        schema_version: u32,
        payload: &T,
        cached_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&EntryRef {
            schema_version,
            cached_at,
            payload,
        })
        .map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;

        self.store.put(CACHE_NAMESPACE, key, &bytes)?;
        tracing::debug!(key, schema_version, "Cache entry written");
        Ok(())
    }

    /// 신선한 엔트리만 반환. 없음/스키마 불일치/만료/해석 불가/스토어 오류는 모두 `None`.
    pub fn read<T: DeserializeOwned>(
        &self,
        key: &str,
        expected_schema_version: u32,
        max_age: Duration,
    ) -> Option<T> {
        self.read_at(key, expected_schema_version, max_age, Utc::now())
    }

    pub fn read_at<T: DeserializeOwned>(
        &self,
        key: &str,
        expected_schema_version: u32,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let entry = self.load_entry(key)?;

        let freshness = freshness::evaluate(&entry.meta(), now, max_age, expected_schema_version);
        if !freshness.is_usable() {
            tracing::debug!(key, ?freshness, "Cache miss");
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(value) => {
                tracing::debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache payload does not match expected shape");
                None
            }
        }
    }

    /// payload를 해석하지 않고 신선도만 확인
    pub fn inspect(&self, key: &str, expected_schema_version: u32, max_age: Duration) -> Freshness {
        self.inspect_at(key, expected_schema_version, max_age, Utc::now())
    }

    pub fn inspect_at(
        &self,
        key: &str,
        expected_schema_version: u32,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Freshness {
        let meta = self.load_entry(key).map(|entry| entry.meta());
        freshness::evaluate_entry(meta.as_ref(), now, max_age, expected_schema_version)
    }

    fn load_entry(&self, key: &str) -> Option<StoredEntry> {
        let bytes = match self.store.get(CACHE_NAMESPACE, key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key, error = %e, "Unreadable cache entry");
                None
            }
        }
    }

    pub fn clear(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(CACHE_NAMESPACE, key)?;
        Ok(())
    }

    /// 캐시 namespace 전체 삭제 (설정은 유지)
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let removed = self.store.clear_namespace(CACHE_NAMESPACE)?;
        tracing::info!(removed, "Shared cache cleared");
        Ok(removed)
    }

    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.store.keys(CACHE_NAMESPACE)?)
    }
}
