//! 메모리 기반 Secret Store (테스트/임시 실행용)

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::secrets::{validate_key, SecretStore, SecretStoreError};

#[derive(Default)]
pub struct InMemorySecretStore {
    map: Mutex<BTreeMap<String, Zeroizing<Vec<u8>>>>,
    /// true면 모든 호출이 `Unavailable` (잠긴 기기 시뮬레이션)
    locked: AtomicBool,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 잠금 상태 전환
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.map.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_map<T>(
        &self,
        key: Option<&str>,
        f: impl FnOnce(&mut BTreeMap<String, Zeroizing<Vec<u8>>>) -> Result<T, SecretStoreError>,
    ) -> Result<T, SecretStoreError> {
        if let Some(key) = key {
            validate_key(key)?;
        }
        if self.locked.load(Ordering::SeqCst) {
            return Err(SecretStoreError::Unavailable("store is locked".to_string()));
        }
        let mut map = self
            .map
            .lock()
            .map_err(|e| SecretStoreError::Unavailable(format!("lock poisoned: {}", e)))?;
        f(&mut map)
    }
}

impl SecretStore for InMemorySecretStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        self.with_map(Some(key), |map| {
            if map.contains_key(key) {
                return Err(SecretStoreError::DuplicateEntry(key.to_string()));
            }
            map.insert(key.to_string(), Zeroizing::new(value.to_vec()));
            Ok(())
        })
    }

    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecretStoreError> {
        self.with_map(Some(key), |map| Ok(map.get(key).cloned()))
    }

    fn update(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        self.with_map(Some(key), |map| {
            map.insert(key.to_string(), Zeroizing::new(value.to_vec()));
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        self.with_map(Some(key), |map| {
            map.remove(key);
            Ok(())
        })
    }

    fn delete_all(&self) -> Result<(), SecretStoreError> {
        self.with_map(None, |map| {
            map.clear();
            Ok(())
        })
    }
}
